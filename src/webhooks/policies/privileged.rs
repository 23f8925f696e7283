//! Privileged container policy.
//!
//! Gated by `checkItems.forbiddenPrivilegedContainer`.
//!
//! A container violates the policy only when its security context is present
//! and sets `privileged: true`. A missing context or a missing flag is the same
//! as `privileged: false`.

use k8s_openapi::api::core::v1::Container;

use super::{Predicate, Violation};
use crate::config::PolicyConfig;

/// Check name reported in denial messages
pub const CHECK_NAME: &str = "forbidden-privileged-container";
/// Reason code for privileged container denials
pub const REASON: &str = "PrivilegedContainer";

/// Registry entry for this check
pub const PREDICATE: Predicate = Predicate {
    name: CHECK_NAME,
    enabled: is_enabled,
    check: validate,
};

fn is_enabled(config: &PolicyConfig) -> bool {
    config.check_items.forbidden_privileged_container
}

/// Fail if the container runs privileged
pub fn validate(container: &Container, _config: &PolicyConfig) -> Result<(), Violation> {
    let privileged = container
        .security_context
        .as_ref()
        .and_then(|ctx| ctx.privileged)
        .unwrap_or(false);

    if privileged {
        return Err(Violation::new(
            CHECK_NAME,
            REASON,
            "privileged security context forbidden",
        ));
    }

    Ok(())
}
