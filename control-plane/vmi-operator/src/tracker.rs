use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, ListParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::errors::Result;
use crate::labels::import_label_selector;

/// Temporary resources found for one import. Either may be missing, both
/// before the import created them and after they were cleaned up.
#[derive(Clone, Debug, Default)]
pub struct TemporaryResources {
    pub config_map: Option<ConfigMap>,
    pub secret: Option<Secret>,
}

impl TemporaryResources {
    pub fn is_empty(&self) -> bool {
        self.config_map.is_none() && self.secret.is_none()
    }
}

/// Finds the temporary resources of an import through the import name label,
/// independently of owner references.
#[derive(Clone)]
pub struct TemporaryResourceTracker {
    client: Client,
}

impl TemporaryResourceTracker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[instrument(level = "debug", skip(self), fields(ns = %namespace, import = %import_name))]
    pub async fn find_by_import(
        &self,
        namespace: &str,
        import_name: &str,
    ) -> Result<TemporaryResources> {
        Ok(TemporaryResources {
            config_map: self.find_config_map(namespace, import_name).await?,
            secret: self.find_secret(namespace, import_name).await?,
        })
    }

    pub async fn find_config_map(
        &self,
        namespace: &str,
        import_name: &str,
    ) -> Result<Option<ConfigMap>> {
        self.first_labeled(namespace, import_name).await
    }

    pub async fn find_secret(
        &self,
        namespace: &str,
        import_name: &str,
    ) -> Result<Option<Secret>> {
        self.first_labeled(namespace, import_name).await
    }

    /// First match in listing order. More than one match is not expected;
    /// it is logged and otherwise ignored.
    async fn first_labeled<K>(
        &self,
        namespace: &str,
        import_name: &str,
    ) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&import_label_selector(import_name));
        let list = api.list(&lp).await?;
        if list.items.len() > 1 {
            debug!(
                kind = %K::kind(&()),
                count = list.items.len(),
                "more than one temporary resource labeled for import; using the first"
            );
        }
        Ok(list.items.into_iter().next())
    }
}
