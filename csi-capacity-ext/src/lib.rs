pub use k8s_openapi as openapi;
pub use k8s_openapi::api::core::v1 as corev1;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

use std::collections::BTreeMap;

use csi_capacity::CAPACITY_ANNOTATION;

pub trait NodeExt {
    fn annotation(&self, key: &str) -> Option<&str>;

    /// The raw capacity annotation value, if the node carries one.
    ///
    fn capacity_annotation(&self) -> Option<&str> {
        self.annotation(CAPACITY_ANNOTATION)
    }
}

impl NodeExt for corev1::Node {
    fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()?
            .get(key)
            .map(String::as_str)
    }
}

/// Clone `annotations` and set `key` to `value` in the clone.
///
/// The input map is never mutated, so a caller holding the node the map came
/// from keeps an unmodified view. An empty `key` is a no-op guard rather
/// than an error: the clone comes back without any insertion.
pub fn clone_and_set_annotation(
    annotations: Option<&BTreeMap<String, String>>,
    key: &str,
    value: impl ToString,
) -> BTreeMap<String, String> {
    let mut cloned = annotations.cloned().unwrap_or_default();
    if key.is_empty() {
        return cloned;
    }
    cloned.insert(key.to_string(), value.to_string());
    cloned
}

pub fn default<T: Default>() -> T {
    T::default()
}
