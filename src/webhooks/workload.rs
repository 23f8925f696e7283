//! Workload kind routing and container extraction.
//!
//! Every supported kind is a variant of [`WorkloadKind`]. The variant knows its
//! group/version/kind triple and where its pod template sits, so the decision
//! loop only ever sees a flat [`Workload`]. Adding a kind means adding a variant.

use std::collections::HashMap;
use std::fmt;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Container, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::admission::AdmissionRequest;
use kube::core::{DynamicObject, GroupVersionKind};

use crate::error::{Error, Result};

/// Workload kinds this webhook knows how to inspect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    /// All supported kinds, in routing-table order
    pub const ALL: [WorkloadKind; 5] = [
        WorkloadKind::Deployment,
        WorkloadKind::StatefulSet,
        WorkloadKind::DaemonSet,
        WorkloadKind::Job,
        WorkloadKind::CronJob,
    ];

    /// The kind name as it appears in `kind:`
    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::Job => "Job",
            WorkloadKind::CronJob => "CronJob",
        }
    }

    /// The full group/version/kind triple served for this kind
    pub fn gvk(self) -> GroupVersionKind {
        let group = match self {
            WorkloadKind::Deployment | WorkloadKind::StatefulSet | WorkloadKind::DaemonSet => {
                "apps"
            }
            WorkloadKind::Job | WorkloadKind::CronJob => "batch",
        };
        GroupVersionKind::gvk(group, "v1", self.as_str())
    }

    /// Decode a raw object of this kind and flatten its pod template.
    ///
    /// Deployment, StatefulSet, DaemonSet and Job keep the template at
    /// `spec.template.spec`; CronJob nests it under `spec.jobTemplate.spec`.
    pub fn extract(self, raw: &[u8]) -> Result<Workload> {
        let decode_err = |source: serde_json::Error| Error::Decode { kind: self, source };

        let (metadata, pod) = match self {
            WorkloadKind::Deployment => {
                let obj: Deployment = serde_json::from_slice(raw).map_err(decode_err)?;
                (obj.metadata, obj.spec.and_then(|s| s.template.spec))
            }
            WorkloadKind::StatefulSet => {
                let obj: StatefulSet = serde_json::from_slice(raw).map_err(decode_err)?;
                (obj.metadata, obj.spec.and_then(|s| s.template.spec))
            }
            WorkloadKind::DaemonSet => {
                let obj: DaemonSet = serde_json::from_slice(raw).map_err(decode_err)?;
                (obj.metadata, obj.spec.and_then(|s| s.template.spec))
            }
            WorkloadKind::Job => {
                let obj: Job = serde_json::from_slice(raw).map_err(decode_err)?;
                (obj.metadata, obj.spec.and_then(|s| s.template.spec))
            }
            WorkloadKind::CronJob => {
                let obj: CronJob = serde_json::from_slice(raw).map_err(decode_err)?;
                let job = obj.spec.and_then(|s| s.job_template.spec);
                (obj.metadata, job.and_then(|j| j.template.spec))
            }
        };

        Ok(Workload::new(self, metadata, pod))
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a kind triple as `group/version, Kind=kind`
pub fn describe_gvk(gvk: &GroupVersionKind) -> String {
    format!("{}/{}, Kind={}", gvk.group, gvk.version, gvk.kind)
}

/// Lookup table from group/version/kind to the workload kind that handles it.
///
/// Matching is on the whole triple, so a `Job` from another API group is not
/// routed to the batch/v1 extractor.
#[derive(Clone, Debug)]
pub struct KindRouter {
    routes: HashMap<GroupVersionKind, WorkloadKind>,
}

impl Default for KindRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl KindRouter {
    /// Build the router for every supported kind
    pub fn new() -> Self {
        let routes = WorkloadKind::ALL
            .into_iter()
            .map(|kind| (kind.gvk(), kind))
            .collect();
        Self { routes }
    }

    /// Find the workload kind for a requested triple
    pub fn route(&self, gvk: &GroupVersionKind) -> Option<WorkloadKind> {
        self.routes.get(gvk).copied()
    }
}

/// Where a container was declared in the pod template
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerRole {
    Container,
    InitContainer,
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRole::Container => f.write_str("container"),
            ContainerRole::InitContainer => f.write_str("init container"),
        }
    }
}

/// A decoded workload, reduced to what the policy needs
#[derive(Clone, Debug)]
pub struct Workload {
    pub kind: WorkloadKind,
    pub metadata: ObjectMeta,
    /// Regular containers, in declaration order
    pub containers: Vec<Container>,
    /// Init containers, in declaration order
    pub init_containers: Vec<Container>,
}

impl Workload {
    fn new(kind: WorkloadKind, metadata: ObjectMeta, pod: Option<PodSpec>) -> Self {
        let (containers, init_containers) = match pod {
            Some(pod) => (pod.containers, pod.init_containers.unwrap_or_default()),
            None => (Vec::new(), Vec::new()),
        };
        Self {
            kind,
            metadata,
            containers,
            init_containers,
        }
    }

    /// Object name, falling back to `generateName` for objects not yet named
    pub fn name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .or(self.metadata.generate_name.as_deref())
            .unwrap_or("<unnamed>")
    }

    /// Containers first, then init containers
    pub fn evaluation_order(&self) -> impl Iterator<Item = (ContainerRole, &Container)> {
        let regular = self
            .containers
            .iter()
            .map(|c| (ContainerRole::Container, c));
        let init = self
            .init_containers
            .iter()
            .map(|c| (ContainerRole::InitContainer, c));
        regular.chain(init)
    }
}

/// One admission request as seen by the decision logic
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadRequest {
    pub uid: String,
    pub kind: GroupVersionKind,
    /// Raw serialized object, `None` when the request carried no object
    pub object: Option<Vec<u8>>,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

impl WorkloadRequest {
    /// Build a request for a raw object
    pub fn new(kind: GroupVersionKind, object: impl Into<Vec<u8>>) -> Self {
        Self {
            uid: String::new(),
            kind,
            object: Some(object.into()),
            namespace: None,
            name: None,
        }
    }

    /// Set the namespace/name used for logging
    pub fn with_location(mut self, namespace: Option<String>, name: Option<String>) -> Self {
        self.namespace = namespace;
        self.name = name;
        self
    }

    /// Pair an admission request envelope with its raw, undecoded object
    pub fn from_admission(
        request: &AdmissionRequest<DynamicObject>,
        object: Option<Vec<u8>>,
    ) -> Self {
        Self {
            uid: request.uid.clone(),
            kind: request.kind.clone(),
            object,
            namespace: request.namespace.clone(),
            name: Some(request.name.clone()).filter(|name| !name.is_empty()),
        }
    }

    /// Raw object bytes, or [`Error::MissingObject`]
    pub fn raw_object(&self) -> Result<&[u8]> {
        self.object.as_deref().ok_or(Error::MissingObject)
    }
}
