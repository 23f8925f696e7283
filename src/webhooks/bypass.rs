//! Whole-object opt-out from policy evaluation.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Annotation that exempts a workload from every check when set to `"true"`
pub const BYPASS_ANNOTATION: &str = "security-webhook-check.bypass";

/// Returns true when the object opts out of evaluation.
///
/// Only the exact value `"true"` counts; `"True"`, `"yes"` or an empty value do not.
pub fn is_bypassed(metadata: &ObjectMeta) -> bool {
    metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(BYPASS_ANNOTATION))
        .is_some_and(|value| value == "true")
}
