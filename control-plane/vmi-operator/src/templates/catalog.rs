use std::collections::BTreeMap;

use kube::Client;
use kube::api::{Api, ListParams};
use kube::core::ObjectList;
use tracing::{debug, instrument};

use crate::crd::template::Template;
use crate::errors::Result;
use crate::labels::{flavor_label, os_label, workload_label};

/// Template search criteria. Unset dimensions are not filtered on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateCriteria {
    pub os: Option<String>,
    pub workload: Option<String>,
    pub flavor: Option<String>,
}

impl TemplateCriteria {
    pub fn os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    pub fn workload(mut self, workload: impl Into<String>) -> Self {
        self.workload = Some(workload.into());
        self
    }

    pub fn flavor(mut self, flavor: impl Into<String>) -> Self {
        self.flavor = Some(flavor.into());
        self
    }

    /// Label keys for the set dimensions, in os, workload, flavor order.
    fn label_keys(&self) -> Vec<String> {
        [
            self.os.as_deref().map(os_label),
            self.workload.as_deref().map(workload_label),
            self.flavor.as_deref().map(flavor_label),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Template labels for the given criteria, each key mapped to `"true"`.
pub fn os_label_builder(criteria: &TemplateCriteria) -> BTreeMap<String, String> {
    criteria
        .label_keys()
        .into_iter()
        .map(|k| (k, "true".to_string()))
        .collect()
}

/// Existence selector with one clause per set dimension. The clause order
/// is fixed so equal criteria always give the same string.
pub fn template_selector(criteria: &TemplateCriteria) -> String {
    criteria.label_keys().join(",")
}

#[derive(Clone)]
pub struct TemplateCatalog {
    client: Client,
}

impl TemplateCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// List the templates in `namespace` matching `criteria`. Store errors are
    /// returned as is.
    #[instrument(level = "debug", skip(self), fields(ns = %namespace))]
    pub async fn find(
        &self,
        namespace: &str,
        criteria: &TemplateCriteria,
    ) -> Result<ObjectList<Template>> {
        let selector = template_selector(criteria);
        let api: Api<Template> = Api::namespaced(self.client.clone(), namespace);
        let lp = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&selector)
        };
        let list = api.list(&lp).await?;
        debug!(%selector, found = list.items.len(), "templates listed");
        Ok(list)
    }
}
