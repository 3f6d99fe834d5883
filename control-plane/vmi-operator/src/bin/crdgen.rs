use kube::core::CustomResourceExt;
use vmi_operator::crd::virtual_machine_import::VirtualMachineImport;

fn main() {
    let crd = VirtualMachineImport::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
    println!("{}", yaml);
}
