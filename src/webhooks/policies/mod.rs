//! Container policies and the admission decision.
//!
//! Evaluation runs in a fixed order:
//! 1. Route the requested kind (unknown kinds are denied)
//! 2. Decode the object (malformed objects are denied)
//! 3. Honour the bypass annotation
//! 4. Run every enabled check over containers, then init containers,
//!    stopping at the first violation

pub mod privileged;

use std::fmt;

use k8s_openapi::api::core::v1::Container;
use tracing::{debug, warn};

use crate::config::PolicyConfig;
use crate::webhooks::bypass::is_bypassed;
use crate::webhooks::workload::{
    ContainerRole, KindRouter, Workload, WorkloadRequest, describe_gvk,
};

/// Reason code for kinds the router does not serve
pub const REASON_UNSUPPORTED_KIND: &str = "UnsupportedKind";
/// Reason code for objects that cannot be decoded
pub const REASON_MALFORMED_OBJECT: &str = "MalformedObject";

/// A failed check on a single container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Name of the check that failed
    pub check: &'static str,
    /// Reason code reported with the denial
    pub reason: &'static str,
    /// What was wrong
    pub detail: String,
}

impl Violation {
    pub fn new(check: &'static str, reason: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            reason,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed check {}: {}", self.check, self.detail)
    }
}

/// Signature shared by every container check
pub type CheckFn = fn(&Container, &PolicyConfig) -> Result<(), Violation>;

/// A container check and the config toggle that enables it
#[derive(Clone, Copy)]
pub struct Predicate {
    pub name: &'static str,
    pub enabled: fn(&PolicyConfig) -> bool,
    pub check: CheckFn,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("name", &self.name).finish()
    }
}

/// Every check the webhook knows about
pub const PREDICATES: &[Predicate] = &[privileged::PREDICATE];

/// Outcome of evaluating one admission request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Whether the object is admitted
    pub allowed: bool,
    /// Reason code for denial (if not allowed)
    pub reason: Option<String>,
    /// Human-readable message (if not allowed)
    pub message: Option<String>,
    /// Admitted through the bypass annotation without evaluation
    pub bypassed: bool,
}

impl AdmissionDecision {
    /// Create an allowed decision
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            message: None,
            bypassed: false,
        }
    }

    /// Create an allowed decision for a bypassed object
    pub fn bypassed() -> Self {
        Self {
            bypassed: true,
            ..Self::allowed()
        }
    }

    /// Create a denied decision
    pub fn denied(reason: &str, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            message: Some(message.into()),
            bypassed: false,
        }
    }

    /// Label used for metrics: `allowed`, or the denial reason code
    pub fn outcome(&self) -> &str {
        if self.allowed {
            "allowed"
        } else {
            self.reason.as_deref().unwrap_or("denied")
        }
    }
}

/// The decision function: routes, decodes and checks workload objects.
///
/// Holds only read-only state and is shared between concurrent requests.
#[derive(Clone, Debug)]
pub struct AdmissionPolicy {
    config: PolicyConfig,
    router: KindRouter,
    active: Vec<Predicate>,
}

impl AdmissionPolicy {
    /// Build the policy. Toggles are read here, once.
    pub fn new(config: PolicyConfig) -> Self {
        let active = PREDICATES
            .iter()
            .filter(|p| (p.enabled)(&config))
            .copied()
            .collect();
        Self {
            config,
            router: KindRouter::new(),
            active,
        }
    }

    /// The configuration the policy was built with
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Names of the checks that will run
    pub fn active_checks(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.active.iter().map(|p| p.name)
    }

    /// Decide whether the requested object is admitted
    pub fn evaluate(&self, request: &WorkloadRequest) -> AdmissionDecision {
        let decision = self.decide(request);
        debug!(
            uid = %request.uid,
            namespace = ?request.namespace,
            name = ?request.name,
            kind = %request.kind.kind,
            allowed = decision.allowed,
            bypassed = decision.bypassed,
            reason = ?decision.reason,
            "Admission evaluated"
        );
        decision
    }

    fn decide(&self, request: &WorkloadRequest) -> AdmissionDecision {
        let Some(kind) = self.router.route(&request.kind) else {
            return AdmissionDecision::denied(
                REASON_UNSUPPORTED_KIND,
                format!("unsupported workload kind: {}", describe_gvk(&request.kind)),
            );
        };

        let workload = match request.raw_object().and_then(|raw| kind.extract(raw)) {
            Ok(workload) => workload,
            Err(e) => {
                warn!(uid = %request.uid, kind = %kind, error = %e, "Failed to decode admission object");
                return AdmissionDecision::denied(
                    REASON_MALFORMED_OBJECT,
                    format!("cannot validate malformed object: {}", e),
                );
            }
        };

        if is_bypassed(&workload.metadata) {
            return AdmissionDecision::bypassed();
        }

        match self.check_workload(&workload) {
            Ok(()) => AdmissionDecision::allowed(),
            Err((role, container, violation)) => AdmissionDecision::denied(
                violation.reason,
                format!(
                    "{} \"{}\" {} \"{}\" {}",
                    workload.kind,
                    workload.name(),
                    role,
                    container.name,
                    violation
                ),
            ),
        }
    }

    /// First violation in evaluation order, if any
    fn check_workload<'w>(
        &self,
        workload: &'w Workload,
    ) -> Result<(), (ContainerRole, &'w Container, Violation)> {
        if self.active.is_empty() {
            return Ok(());
        }
        for (role, container) in workload.evaluation_order() {
            for predicate in &self.active {
                (predicate.check)(container, &self.config)
                    .map_err(|violation| (role, container, violation))?;
            }
        }
        Ok(())
    }
}
