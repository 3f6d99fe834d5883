pub mod catalog;
pub mod processor;

pub use catalog::*;
pub use processor::*;

use async_trait::async_trait;
use kube::Client;
use kube::core::ObjectList;

use crate::crd::template::Template;
use crate::errors::Result;

/// Searches for and processes templates on the cluster.
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    async fn find(
        &self,
        namespace: &str,
        criteria: &TemplateCriteria,
    ) -> Result<ObjectList<Template>>;

    async fn process(
        &self,
        namespace: &str,
        target_name: Option<&str>,
        template: &Template,
    ) -> Result<Template>;
}

/// Cluster-backed [`TemplateProvider`].
#[derive(Clone)]
pub struct Templates {
    catalog: TemplateCatalog,
    processor: TemplateProcessor,
}

impl Templates {
    pub fn new(client: Client) -> Self {
        Self {
            catalog: TemplateCatalog::new(client.clone()),
            processor: TemplateProcessor::new(client),
        }
    }
}

#[async_trait]
impl TemplateProvider for Templates {
    async fn find(
        &self,
        namespace: &str,
        criteria: &TemplateCriteria,
    ) -> Result<ObjectList<Template>> {
        self.catalog.find(namespace, criteria).await
    }

    async fn process(
        &self,
        namespace: &str,
        target_name: Option<&str>,
        template: &Template,
    ) -> Result<Template> {
        self.processor.process(namespace, target_name, template).await
    }
}
