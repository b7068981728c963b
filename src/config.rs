//! Controller configuration
//!
//! Loaded from YAML; every field has a default so an empty file (or no file)
//! yields a working configuration. Selected fields can be overridden from
//! the environment:
//!   POLICY_CONTROL_WEBHOOK_ADDR      webhook listen address
//!   POLICY_CONTROL_NOT_APPLICABLE    `halt_chain` or `skip_policy`

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::gatus::DEFAULT_DNS_RESOLVER;
use crate::render::DEFAULT_NAME_TEMPLATE;

pub const ENV_CONFIG_PATH: &str = "POLICY_CONTROL_CONFIG";
pub const ENV_WEBHOOK_ADDR: &str = "POLICY_CONTROL_WEBHOOK_ADDR";
pub const ENV_NOT_APPLICABLE: &str = "POLICY_CONTROL_NOT_APPLICABLE";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dispatch: DispatchConfig,
    pub policies: PoliciesConfig,
    pub controller: ControllerConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub not_applicable: NotApplicable,
}

/// What dispatch does when a policy reports it does not apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotApplicable {
    /// Stop the chain for this event; later policies do not run.
    #[default]
    HaltChain,
    /// Skip only the non-applicable policy and continue.
    SkipPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliciesConfig {
    pub pod_cpu_limits: PodCpuLimitsConfig,
    pub ingress_gatus: IngressGatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PodCpuLimitsConfig {
    pub enabled: bool,
}

impl Default for PodCpuLimitsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressGatusConfig {
    pub enabled: bool,
    /// Handlebars template for the config map name (`name`, `namespace`).
    pub name_template: String,
    /// Resolver written into `client.dnsResolver` when DNS is requested.
    pub dns_resolver: String,
}

impl Default for IngressGatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name_template: DEFAULT_NAME_TEMPLATE.to_string(),
            dns_resolver: DEFAULT_DNS_RESOLVER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Watch ingresses and reconcile generated artifacts.
    pub enabled: bool,
    /// Delay before the runtime retries a failed reconcile.
    pub requeue_after_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requeue_after_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub bind_addr: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: "0.0.0.0:8443".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PolicyError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, PolicyError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| PolicyError::Config(e.to_string()))
    }

    /// Apply overrides from environment variables.
    pub fn with_env_overrides(self) -> Result<Self, PolicyError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, PolicyError> {
        if let Some(addr) = lookup(ENV_WEBHOOK_ADDR) {
            self.webhook.bind_addr = addr;
        }
        if let Some(mode) = lookup(ENV_NOT_APPLICABLE) {
            self.dispatch.not_applicable = match mode.as_str() {
                "halt_chain" => NotApplicable::HaltChain,
                "skip_policy" => NotApplicable::SkipPolicy,
                other => {
                    return Err(PolicyError::Config(format!(
                        "{ENV_NOT_APPLICABLE} must be halt_chain or skip_policy, got '{other}'"
                    )))
                }
            };
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_yaml_is_default() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.dispatch.not_applicable, NotApplicable::HaltChain);
        assert!(config.policies.pod_cpu_limits.enabled);
        assert_eq!(config.policies.ingress_gatus.name_template, "{{name}}-gatus-generated");
        assert_eq!(config.policies.ingress_gatus.dns_resolver, "tcp://1.1.1.1:53");
        assert_eq!(config.controller.requeue_after_secs, 30);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = Config::from_yaml(
            r#"
dispatch:
  not_applicable: skip_policy
policies:
  ingress_gatus:
    dns_resolver: "tcp://9.9.9.9:53"
webhook:
  enabled: false
"#,
        )
        .unwrap();
        assert_eq!(config.dispatch.not_applicable, NotApplicable::SkipPolicy);
        assert!(config.policies.ingress_gatus.enabled);
        assert_eq!(config.policies.ingress_gatus.dns_resolver, "tcp://9.9.9.9:53");
        assert!(!config.webhook.enabled);
        assert_eq!(config.webhook.bind_addr, "0.0.0.0:8443");
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config = Config::from_yaml(include_str!("../config/policy-control.yaml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.dispatch.not_applicable, defaults.dispatch.not_applicable);
        assert_eq!(
            config.policies.ingress_gatus.name_template,
            defaults.policies.ingress_gatus.name_template
        );
        assert_eq!(config.webhook.bind_addr, defaults.webhook.bind_addr);
        assert_eq!(
            config.controller.requeue_after_secs,
            defaults.controller.requeue_after_secs
        );
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = Config::from_yaml("dispatch:\n  not_applicable: maybe\n").unwrap_err();
        assert!(matches!(err, PolicyError::Config(_)));
    }

    #[test]
    fn overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_WEBHOOK_ADDR, "127.0.0.1:9443"),
            (ENV_NOT_APPLICABLE, "skip_policy"),
        ]);
        let config = Config::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.webhook.bind_addr, "127.0.0.1:9443");
        assert_eq!(config.dispatch.not_applicable, NotApplicable::SkipPolicy);

        let bad: HashMap<&str, &str> = HashMap::from([(ENV_NOT_APPLICABLE, "sometimes")]);
        assert!(Config::default()
            .with_overrides(|k| bad.get(k).map(|v| v.to_string()))
            .is_err());
    }
}
