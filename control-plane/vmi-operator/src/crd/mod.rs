pub mod kubevirt;
pub mod template;
pub mod virtual_machine_import;
