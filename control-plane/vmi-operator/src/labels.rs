//! Well-known label and annotation keys, and the import-name → label-value
//! transform used to tag every temporary resource an import creates.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Prefix of the template label carrying the supported OS, e.g.
/// `os.template.kubevirt.io/rhel8.2`.
pub const TEMPLATE_OS_LABEL_PREFIX: &str = "os.template.kubevirt.io/";

/// Prefix of the template label carrying the workload, e.g.
/// `workload.template.kubevirt.io/server`.
pub const TEMPLATE_WORKLOAD_LABEL_PREFIX: &str = "workload.template.kubevirt.io/";

/// Prefix of the template label carrying the flavor, e.g.
/// `flavor.template.kubevirt.io/medium`.
pub const TEMPLATE_FLAVOR_LABEL_PREFIX: &str = "flavor.template.kubevirt.io/";

/// Prefix of the template annotation holding the human readable OS name.
pub const TEMPLATE_NAME_OS_ANNOTATION_PREFIX: &str = "name.os.template.kubevirt.io/";

/// Label put on temporary resources; the value comes from [`derive_label_value`].
pub const IMPORT_NAME_LABEL: &str = "vmimport.v2v.kubevirt.io/vmi-name";

/// Maximum length of a label value accepted by the API server.
pub const LABEL_VALUE_MAX_LENGTH: usize = 63;

const HASH_SUFFIX_LENGTH: usize = 10;

pub fn os_label(os: &str) -> String {
    format!("{TEMPLATE_OS_LABEL_PREFIX}{os}")
}

pub fn workload_label(workload: &str) -> String {
    format!("{TEMPLATE_WORKLOAD_LABEL_PREFIX}{workload}")
}

pub fn flavor_label(flavor: &str) -> String {
    format!("{TEMPLATE_FLAVOR_LABEL_PREFIX}{flavor}")
}

pub fn os_name_annotation(os: &str) -> String {
    format!("{TEMPLATE_NAME_OS_ANNOTATION_PREFIX}{os}")
}

/// Map an import name to a value usable as a label value.
///
/// Names that already are valid label values are kept as is. Anything else
/// (too long, or containing characters outside `[A-Za-z0-9-_.]`) is
/// sanitized, cut down to a prefix and suffixed with a short SHA-256 digest
/// of the original name, so two long names sharing a prefix still map to
/// different values.
pub fn derive_label_value(import_name: &str) -> String {
    if is_valid_label_value(import_name) {
        return import_name.to_string();
    }

    let digest = hex::encode(Sha256::digest(import_name.as_bytes()));
    let suffix = &digest[..HASH_SUFFIX_LENGTH];

    let sanitized: String = import_name
        .chars()
        .map(|c| if is_label_char(c) { c } else { '-' })
        .take(LABEL_VALUE_MAX_LENGTH - HASH_SUFFIX_LENGTH - 1)
        .collect();
    let prefix = sanitized.trim_matches(|c: char| !c.is_ascii_alphanumeric());

    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{prefix}-{suffix}")
    }
}

/// Checks the API server's label value rules: at most 63 characters,
/// alphanumeric at both ends, `-`, `_` and `.` allowed in between. The
/// empty string is valid.
pub fn is_valid_label_value(value: &str) -> bool {
    if value.len() > LABEL_VALUE_MAX_LENGTH {
        return false;
    }
    let (Some(first), Some(last)) = (value.chars().next(), value.chars().last())
    else {
        return true;
    };
    first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && value.chars().all(is_label_char)
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Labels put on every temporary resource of the given import.
pub fn import_labels(import_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(
        IMPORT_NAME_LABEL.to_string(),
        derive_label_value(import_name),
    )])
}

/// Equality selector matching the temporary resources of an import.
pub fn import_label_selector(import_name: &str) -> String {
    format!("{}={}", IMPORT_NAME_LABEL, derive_label_value(import_name))
}
