//! Append-only policy registry.
//!
//! Registration happens once during startup through `&mut` access; the
//! registry is then moved behind an `Arc` into the [`super::Dispatcher`],
//! after which no further registration is possible.

use std::collections::HashMap;
use std::sync::Arc;

use super::Policy;
use crate::resource::ResourceType;

#[derive(Default)]
pub struct PolicyRegistry {
    policies: Vec<Arc<dyn Policy>>,
    by_type: HashMap<ResourceType, Vec<Arc<dyn Policy>>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a policy. Registration order is execution order.
    pub fn register(&mut self, policy: Arc<dyn Policy>) {
        self.by_type
            .entry(policy.resource_type())
            .or_default()
            .push(Arc::clone(&policy));
        self.policies.push(policy);
    }

    /// Every registered policy, in registration order.
    pub fn all_policies(&self) -> &[Arc<dyn Policy>] {
        &self.policies
    }

    /// Policies whose type is `resource_type`, in registration order.
    pub fn policies_by_type(&self, resource_type: ResourceType) -> &[Arc<dyn Policy>] {
        self.by_type
            .get(&resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::resource::{Operation, Resource};
    use async_trait::async_trait;

    struct Named(&'static str, ResourceType);

    #[async_trait]
    impl Policy for Named {
        fn name(&self) -> &'static str {
            self.0
        }
        fn resource_type(&self) -> ResourceType {
            self.1
        }
        async fn validate(&self, _resource: &Resource) -> Result<bool> {
            Ok(true)
        }
        async fn apply(&self, _resource: &mut Resource, _operation: Operation) -> Result<()> {
            Ok(())
        }
    }

    fn names(policies: &[Arc<dyn Policy>]) -> Vec<&'static str> {
        policies.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn by_type_preserves_registration_order() {
        let mut registry = PolicyRegistry::new();
        registry.register(Arc::new(Named("a", ResourceType::Pod)));
        registry.register(Arc::new(Named("b", ResourceType::Ingress)));
        registry.register(Arc::new(Named("c", ResourceType::Pod)));

        assert_eq!(names(registry.all_policies()), vec!["a", "b", "c"]);
        assert_eq!(names(registry.policies_by_type(ResourceType::Pod)), vec!["a", "c"]);
        assert_eq!(names(registry.policies_by_type(ResourceType::Ingress)), vec!["b"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn empty_type_yields_no_policies() {
        let registry = PolicyRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.policies_by_type(ResourceType::Ingress).is_empty());
    }
}
