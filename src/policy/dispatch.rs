//! Dispatch engine: runs the policy chain for one resource event.
//!
//! For each policy registered for the event's type, in order:
//! validate error → abort and propagate; not applicable → stop the chain
//! with success (or skip just that policy under [`NotApplicable::SkipPolicy`]);
//! otherwise apply, aborting and propagating on error.

use std::sync::Arc;

use super::registry::PolicyRegistry;
use crate::config::NotApplicable;
use crate::error::{PolicyError, Result};
use crate::resource::{Operation, Resource, ResourceType};

/// Summary of one dispatch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Policies whose `apply` completed.
    pub applied: Vec<&'static str>,
    /// The policy that reported not-applicable and halted the chain, if any.
    pub halted_by: Option<&'static str>,
    /// Policies skipped as not applicable without halting the chain.
    pub skipped: Vec<&'static str>,
}

pub struct Dispatcher {
    registry: Arc<PolicyRegistry>,
    not_applicable: NotApplicable,
}

impl Dispatcher {
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self {
            registry,
            not_applicable: NotApplicable::HaltChain,
        }
    }

    pub fn with_not_applicable(mut self, mode: NotApplicable) -> Self {
        self.not_applicable = mode;
        self
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Run every `resource_type` policy against `resource`.
    pub async fn apply_policies_by_type(
        &self,
        resource_type: ResourceType,
        resource: &mut Resource,
        operation: Operation,
    ) -> Result<DispatchReport> {
        if resource.resource_type() != resource_type {
            return Err(PolicyError::type_mismatch(
                "dispatch",
                resource_type,
                resource.resource_type(),
            ));
        }

        let mut report = DispatchReport::default();
        let object = format!("{}/{}", resource.namespace(), resource.display_name());

        for policy in self.registry.policies_by_type(resource_type) {
            let name = policy.name();
            tracing::debug!(policy = name, resource = %object, %operation, "applying policy");

            if !policy.validate(resource).await? {
                match self.not_applicable {
                    NotApplicable::HaltChain => {
                        tracing::debug!(
                            policy = name,
                            resource = %object,
                            "policy not applicable, halting chain"
                        );
                        report.halted_by = Some(name);
                        return Ok(report);
                    }
                    NotApplicable::SkipPolicy => {
                        tracing::debug!(
                            policy = name,
                            resource = %object,
                            "policy not applicable, skipping"
                        );
                        report.skipped.push(name);
                        continue;
                    }
                }
            }

            if let Err(e) = policy.apply(resource, operation).await {
                tracing::error!(
                    policy = name,
                    resource = %object,
                    error = %e,
                    "error running policy"
                );
                return Err(e);
            }
            report.applied.push(name);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::Pod;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Verdict {
        Applicable,
        NotApplicable,
        ValidateFails,
        ApplyFails,
    }

    struct Probe {
        name: &'static str,
        resource_type: ResourceType,
        verdict: Verdict,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Policy for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn resource_type(&self) -> ResourceType {
            self.resource_type
        }

        async fn validate(&self, _resource: &Resource) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("validate:{}", self.name));
            match self.verdict {
                Verdict::NotApplicable => Ok(false),
                Verdict::ValidateFails => Err(PolicyError::Config("validate failed".into())),
                _ => Ok(true),
            }
        }

        async fn apply(&self, _resource: &mut Resource, _operation: Operation) -> Result<()> {
            self.calls.lock().unwrap().push(format!("apply:{}", self.name));
            match self.verdict {
                Verdict::ApplyFails => Err(PolicyError::Config("apply failed".into())),
                _ => Ok(()),
            }
        }
    }

    struct Harness {
        registry: PolicyRegistry,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: PolicyRegistry::new(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn with(
            mut self,
            name: &'static str,
            resource_type: ResourceType,
            verdict: Verdict,
        ) -> Self {
            self.registry.register(Arc::new(Probe {
                name,
                resource_type,
                verdict,
                calls: Arc::clone(&self.calls),
            }));
            self
        }

        fn into_parts(self) -> (Dispatcher, Arc<Mutex<Vec<String>>>) {
            (Dispatcher::new(Arc::new(self.registry)), self.calls)
        }
    }

    fn pod() -> Resource {
        let mut pod = Pod::default();
        pod.metadata.name = Some("web".into());
        pod.metadata.namespace = Some("apps".into());
        Resource::Pod(pod)
    }

    fn calls(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn runs_matching_policies_in_order() {
        let (dispatcher, log) = Harness::new()
            .with("first", ResourceType::Pod, Verdict::Applicable)
            .with("ingress-only", ResourceType::Ingress, Verdict::Applicable)
            .with("second", ResourceType::Pod, Verdict::Applicable)
            .into_parts();

        let report = dispatcher
            .apply_policies_by_type(ResourceType::Pod, &mut pod(), Operation::Upsert)
            .await
            .unwrap();

        assert_eq!(report.applied, vec!["first", "second"]);
        assert_eq!(
            calls(&log),
            vec!["validate:first", "apply:first", "validate:second", "apply:second"]
        );
    }

    #[tokio::test]
    async fn not_applicable_halts_the_whole_chain() {
        let (dispatcher, log) = Harness::new()
            .with("opt-out", ResourceType::Pod, Verdict::NotApplicable)
            .with("never", ResourceType::Pod, Verdict::Applicable)
            .into_parts();

        let report = dispatcher
            .apply_policies_by_type(ResourceType::Pod, &mut pod(), Operation::Upsert)
            .await
            .unwrap();

        assert_eq!(report.halted_by, Some("opt-out"));
        assert!(report.applied.is_empty());
        assert_eq!(calls(&log), vec!["validate:opt-out"]);
    }

    #[tokio::test]
    async fn skip_mode_continues_past_not_applicable() {
        let (dispatcher, log) = Harness::new()
            .with("opt-out", ResourceType::Pod, Verdict::NotApplicable)
            .with("next", ResourceType::Pod, Verdict::Applicable)
            .into_parts();
        let dispatcher = dispatcher.with_not_applicable(NotApplicable::SkipPolicy);

        let report = dispatcher
            .apply_policies_by_type(ResourceType::Pod, &mut pod(), Operation::Upsert)
            .await
            .unwrap();

        assert_eq!(report.skipped, vec!["opt-out"]);
        assert_eq!(report.applied, vec!["next"]);
        assert_eq!(calls(&log), vec!["validate:opt-out", "validate:next", "apply:next"]);
    }

    #[tokio::test]
    async fn validate_error_aborts_and_propagates() {
        let (dispatcher, log) = Harness::new()
            .with("broken", ResourceType::Pod, Verdict::ValidateFails)
            .with("never", ResourceType::Pod, Verdict::Applicable)
            .into_parts();

        let err = dispatcher
            .apply_policies_by_type(ResourceType::Pod, &mut pod(), Operation::Upsert)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("validate failed"));
        assert_eq!(calls(&log), vec!["validate:broken"]);
    }

    #[tokio::test]
    async fn apply_error_aborts_and_propagates() {
        let (dispatcher, log) = Harness::new()
            .with("broken", ResourceType::Pod, Verdict::ApplyFails)
            .with("never", ResourceType::Pod, Verdict::Applicable)
            .into_parts();

        let err = dispatcher
            .apply_policies_by_type(ResourceType::Pod, &mut pod(), Operation::Delete)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("apply failed"));
        assert_eq!(calls(&log), vec!["validate:broken", "apply:broken"]);
    }

    #[tokio::test]
    async fn mismatched_tag_is_rejected_before_any_policy_runs() {
        let (dispatcher, log) = Harness::new()
            .with("ingress", ResourceType::Ingress, Verdict::Applicable)
            .into_parts();

        let err = dispatcher
            .apply_policies_by_type(ResourceType::Ingress, &mut pod(), Operation::Upsert)
            .await
            .unwrap_err();

        assert!(matches!(err, PolicyError::TypeMismatch { .. }));
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn no_policies_for_type_is_success() {
        let (dispatcher, _log) = Harness::new().into_parts();
        let report = dispatcher
            .apply_policies_by_type(ResourceType::Pod, &mut pod(), Operation::Upsert)
            .await
            .unwrap();
        assert_eq!(report, DispatchReport::default());
    }
}
