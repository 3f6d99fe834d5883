//! Minimal views of the KubeVirt and CDI resources an import produces. Only
//! the fields the operator reads are modelled; patches are merge patches so
//! nothing else on the objects is touched.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "kubevirt.io",
    version = "v1",
    kind = "VirtualMachine",
    plural = "virtualmachines",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    pub running: Option<bool>,
    pub template: Option<VirtualMachineInstanceTemplate>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct VirtualMachineInstanceTemplate {
    pub spec: Option<VirtualMachineInstanceSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct VirtualMachineInstanceSpec {
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub data_volume: Option<DataVolumeSource>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct DataVolumeSource {
    pub name: String,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "cdi.kubevirt.io",
    version = "v1beta1",
    kind = "DataVolume",
    plural = "datavolumes",
    namespaced,
    status = "DataVolumeStatus"
)]
pub struct DataVolumeSpec {
    pub source: Option<serde_json::Value>,
    pub pvc: Option<serde_json::Value>,
    pub storage: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct DataVolumeStatus {
    pub phase: Option<String>,
    pub progress: Option<String>,
}

impl VirtualMachine {
    /// Names of the DataVolumes referenced from the VM's volumes, in
    /// declaration order.
    pub fn data_volume_names(&self) -> Vec<String> {
        self.spec
            .template
            .as_ref()
            .and_then(|t| t.spec.as_ref())
            .map(|s| {
                s.volumes
                    .iter()
                    .filter_map(|v| v.data_volume.as_ref())
                    .map(|dv| dv.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
