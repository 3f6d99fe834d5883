//! Owner references and the temporary resources an import creates.
//!
//! Deleting an import has to take everything it produced with it. The
//! temporary ConfigMap and Secret, and the target VirtualMachine, are owned
//! by the import; the VM's DataVolumes are owned by the VM. Foreground
//! deletion of the import then walks the whole chain.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::labels::import_labels;

/// `generateName` of temporary resources.
pub const TEMPORARY_NAME_PREFIX: &str = "vmimport.v2v.kubevirt.io";

/// Key of the CA certificate in the provider credentials secret.
pub const PROVIDER_CA_CERT_KEY: &str = "caCert";

/// Key of the CA certificate in the temporary ConfigMap.
pub const CONFIG_MAP_CA_KEY: &str = "ca.pem";

/// Owner reference pointing at `owner`, blocking its deletion until the
/// dependent is gone. `None` when the owner has no uid yet.
pub fn owner_reference<K>(owner: &K, controller: bool) -> Option<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    let uid = owner.meta().uid.clone()?;
    Some(OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid,
        controller: Some(controller),
        block_owner_deletion: Some(true),
    })
}

/// Owner references with `owner` added, or `None` when an owner with the same
/// uid is already present and nothing needs patching.
pub fn with_owner(
    existing: Option<&Vec<OwnerReference>>,
    owner: &OwnerReference,
) -> Option<Vec<OwnerReference>> {
    let mut refs = existing.cloned().unwrap_or_default();
    if refs.iter().any(|r| r.uid == owner.uid) {
        return None;
    }
    refs.push(owner.clone());
    Some(refs)
}

fn temporary_meta(
    namespace: &str,
    import_name: &str,
    owner: &OwnerReference,
) -> ObjectMeta {
    ObjectMeta {
        generate_name: Some(TEMPORARY_NAME_PREFIX.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(import_labels(import_name)),
        owner_references: Some(vec![owner.clone()]),
        ..Default::default()
    }
}

/// Temporary ConfigMap carrying the provider CA certificate, if any.
pub fn temporary_config_map(
    namespace: &str,
    import_name: &str,
    owner: &OwnerReference,
    ca_cert: Option<String>,
) -> ConfigMap {
    ConfigMap {
        metadata: temporary_meta(namespace, import_name, owner),
        data: ca_cert.map(|ca| BTreeMap::from([(CONFIG_MAP_CA_KEY.to_string(), ca)])),
        ..Default::default()
    }
}

/// Temporary Secret holding a copy of the provider credentials.
pub fn temporary_secret(
    namespace: &str,
    import_name: &str,
    owner: &OwnerReference,
    data: Option<BTreeMap<String, ByteString>>,
) -> Secret {
    Secret {
        metadata: temporary_meta(namespace, import_name, owner),
        data,
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// CA certificate found in the provider credentials secret.
pub fn provider_ca_cert(secret: &Secret) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(PROVIDER_CA_CERT_KEY))
        .map(|b| String::from_utf8_lossy(&b.0).into_owned())
}
