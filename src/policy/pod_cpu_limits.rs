//! Strip CPU limits from pod containers.
//!
//! Pods opt out with `policy-control.aumer.io/keep-limits: "true"`, which
//! reports the policy as not applicable.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod};

use super::Policy;
use crate::annotations;
use crate::error::{PolicyError, Result};
use crate::resource::{display_name, Operation, Resource, ResourceType};

pub const CPU: &str = "cpu";

#[derive(Debug, Default)]
pub struct PodCpuLimits;

impl PodCpuLimits {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Policy for PodCpuLimits {
    fn name(&self) -> &'static str {
        "Pod CPU Limits"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Pod
    }

    async fn validate(&self, resource: &Resource) -> Result<bool> {
        let pod = resource.as_pod().ok_or_else(|| {
            PolicyError::type_mismatch(self.name(), ResourceType::Pod, resource.resource_type())
        })?;

        if annotations::bool_value(annotations::KEEP_LIMITS, resource.annotations(), false) {
            tracing::info!(
                pod = %display_name(&pod.metadata),
                "skipping pod because annotation is explicitly true"
            );
            return Ok(false);
        }
        Ok(true)
    }

    async fn apply(&self, resource: &mut Resource, _operation: Operation) -> Result<()> {
        let found = resource.resource_type();
        let pod = resource
            .as_pod_mut()
            .ok_or_else(|| PolicyError::type_mismatch(self.name(), ResourceType::Pod, found))?;
        strip_limits(pod, CPU);
        Ok(())
    }
}

/// Remove `limit` from every container and init container. Returns how many
/// entries were removed; a container without the limit is left untouched.
pub fn strip_limits(pod: &mut Pod, limit: &str) -> usize {
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let pod_name = display_name(&pod.metadata);
    let Some(spec) = pod.spec.as_mut() else {
        return 0;
    };

    let init = spec.init_containers.iter_mut().flatten();
    let mut removed = 0;
    for container in init.chain(spec.containers.iter_mut()) {
        if remove_container_limit(container, limit) {
            removed += 1;
            tracing::info!(
                namespace = %namespace,
                pod = %pod_name,
                container = %container.name,
                limit,
                "removed resource limit"
            );
        }
    }
    removed
}

fn remove_container_limit(container: &mut Container, limit: &str) -> bool {
    container
        .resources
        .as_mut()
        .and_then(|resources| resources.limits.as_mut())
        .map(|limits| limits.remove(limit).is_some())
        .unwrap_or(false)
}
