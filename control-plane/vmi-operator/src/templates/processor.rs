use kube::api::PostParams;
use kube::core::Request;
use kube::{Client, ResourceExt};
use tracing::{debug, instrument};

use crate::crd::template::Template;
use crate::errors::{Result, VmiError};

/// Parameter that receives the target VM name.
pub const NAME_PARAMETER: &str = "NAME";

/// Value sent for every parameter other than [`NAME_PARAMETER`].
///
/// Caller supplied values of those parameters are discarded.
pub const SUBSTITUTE_VALUE: &str = "other";

const PROCESSING_RESOURCE: &str = "processedtemplates";

/// Copy of `template` with the parameter values that get sent for
/// processing. `NAME` is set to `target_name` when given and left alone
/// otherwise; every other parameter becomes [`SUBSTITUTE_VALUE`].
pub fn assign_parameters(template: &Template, target_name: Option<&str>) -> Template {
    let mut processed = template.clone();
    for param in processed.parameters.iter_mut() {
        if param.name == NAME_PARAMETER {
            if let Some(name) = target_name {
                param.value = Some(name.to_string());
            }
        } else {
            param.value = Some(SUBSTITUTE_VALUE.to_string());
        }
    }
    processed
}

fn processing_path(namespace: &str) -> String {
    format!(
        "/apis/{}/namespaces/{}/{}",
        <Template as k8s_openapi::Resource>::API_VERSION,
        namespace,
        PROCESSING_RESOURCE
    )
}

/// Submits templates to the server-side `processedtemplates` endpoint, which
/// expands `${PARAMETER}` references in the template objects.
#[derive(Clone)]
pub struct TemplateProcessor {
    client: Client,
}

impl TemplateProcessor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Process `template` in `namespace`. The input is never modified. Either
    /// the fully processed template comes back or an error does.
    #[instrument(level = "debug", skip(self, template), fields(ns = %namespace, template = %template.name_any()))]
    pub async fn process(
        &self,
        namespace: &str,
        target_name: Option<&str>,
        template: &Template,
    ) -> Result<Template> {
        let mut body = assign_parameters(template, target_name);
        body.types.get_or_insert_with(Template::type_meta);

        let req = Request::new(processing_path(namespace))
            .create(&PostParams::default(), serde_json::to_vec(&body)?)
            .map_err(kube::Error::BuildRequest)?;
        let processed = self
            .client
            .request::<Template>(req)
            .await
            .map_err(processing_error)?;
        debug!(objects = processed.objects.len(), "template processed");
        Ok(processed)
    }
}

/// Rejections of the submitted template become [`VmiError::Processing`];
/// everything else stays a plain API error.
fn processing_error(err: kube::Error) -> VmiError {
    match err {
        kube::Error::Api(ae) if ae.code == 400 || ae.code == 422 => {
            VmiError::Processing(ae.message)
        }
        other => other.into(),
    }
}
