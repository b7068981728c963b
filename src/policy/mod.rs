//! Policy Module
//!
//! A policy is a named rule over one resource type. Dispatch runs every
//! policy registered for a type in registration order, calling
//! [`Policy::validate`] and then [`Policy::apply`].
//!
//! ## Available Policies:
//! - `pod_cpu_limits`: strips CPU limits from pod containers
//! - `ingress_gatus`: maintains a Gatus endpoint config map per annotated ingress

pub mod dispatch;
pub mod ingress_gatus;
pub mod pod_cpu_limits;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, NotApplicable};
use crate::error::Result;
use crate::resource::{Operation, Resource, ResourceType};
use crate::store::ObjectStore;

pub use dispatch::Dispatcher;
pub use ingress_gatus::IngressGenerateGatus;
pub use pod_cpu_limits::PodCpuLimits;
pub use registry::PolicyRegistry;

/// A single cluster policy.
///
/// Implementations hold no per-object state between calls; everything they
/// need about an object is read from the `resource` argument.
#[async_trait]
pub trait Policy: Send + Sync {
    fn name(&self) -> &'static str;

    /// The only resource type this policy is routed to.
    fn resource_type(&self) -> ResourceType;

    /// Whether the policy applies to `resource`. `Ok(false)` is not an error.
    async fn validate(&self, resource: &Resource) -> Result<bool>;

    async fn apply(&self, resource: &mut Resource, operation: Operation) -> Result<()>;
}

/// Register the standard policies in their fixed execution order.
pub fn register_all_policies(
    registry: &mut PolicyRegistry,
    config: &Config,
    store: Arc<dyn ObjectStore>,
) -> Result<()> {
    if config.policies.pod_cpu_limits.enabled {
        registry.register(Arc::new(PodCpuLimits::new()));
    }
    if config.policies.ingress_gatus.enabled {
        registry.register(Arc::new(IngressGenerateGatus::from_config(
            &config.policies.ingress_gatus,
            store,
        )?));
    }
    Ok(())
}

/// Build the sealed registry and dispatcher for a configuration.
pub fn build_dispatcher(config: &Config, store: Arc<dyn ObjectStore>) -> Result<Dispatcher> {
    let mut registry = PolicyRegistry::new();
    register_all_policies(&mut registry, config, store)?;
    for policy in registry.all_policies() {
        tracing::info!(
            policy = policy.name(),
            resource = %policy.resource_type(),
            "registered policy"
        );
    }
    let mode: NotApplicable = config.dispatch.not_applicable;
    Ok(Dispatcher::new(Arc::new(registry)).with_not_applicable(mode))
}
