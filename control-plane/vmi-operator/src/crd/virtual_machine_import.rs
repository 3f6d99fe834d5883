use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const PHASE_PROCESSING: &str = "Processing";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "v2v.kubevirt.io",
    version = "v1beta1",
    kind = "VirtualMachineImport",
    plural = "virtualmachineimports",
    shortname = "vmimport",
    namespaced,
    status = "VirtualMachineImportStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineImportSpec {
    /// Secret holding the source provider's credentials and CA certificate
    pub provider_credentials_secret: ObjectIdentifier,
    /// Optional mapping of source networks/storage to target resources
    pub resource_mapping: Option<ObjectIdentifier>,
    pub source: VirtualMachineImportSource,
    /// Name of the VM to create; defaults to the import name
    pub target_vm_name: Option<String>,
    pub start_vm: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
pub struct ObjectIdentifier {
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct VirtualMachineImportSource {
    pub vm: SourceVmIdentifier,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct SourceVmIdentifier {
    pub id: Option<String>,
    pub name: Option<String>,
    pub cluster: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineImportStatus {
    pub phase: Option<String>,
    pub target_vm_name: Option<String>,
    pub data_volumes: Option<Vec<String>>,
    pub conditions: Option<Vec<Condition>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub last_transition_time: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    Processing,
    Succeeded,
    Valid,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl VirtualMachineImport {
    /// Name of the VM this import produces.
    pub fn target_vm_name(&self) -> String {
        self.spec
            .target_vm_name
            .clone()
            .unwrap_or_else(|| kube::ResourceExt::name_any(self))
    }
}
