//! Gatus endpoint documents derived from ingress annotations.
//!
//! Field defaults:
//! - name: the ingress name (or generate-name)
//! - group: `default`
//! - url: host + path, each taken from the first ingress rule unless overridden
//! - interval: `1m`
//! - conditions: `[STATUS] == 200`, or the comma-split annotation value
//! - client.dnsResolver: only when the DNS annotation is `"true"`

use k8s_openapi::api::networking::v1::Ingress;
use serde::{Deserialize, Serialize};

use crate::annotations::{self, string_value};
use crate::error::PolicyError;
use crate::resource::{display_name, ResourceType};

/// Data key holding the rendered document inside the artifact.
pub const CONFIG_KEY: &str = "config.yaml";
pub const DEFAULT_GROUP: &str = "default";
pub const DEFAULT_INTERVAL: &str = "1m";
pub const DEFAULT_CONDITION: &str = "[STATUS] == 200";
pub const DEFAULT_DNS_RESOLVER: &str = "tcp://1.1.1.1:53";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatusConfig {
    pub endpoints: Vec<GatusEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatusEndpoint {
    pub name: String,
    pub group: String,
    pub url: String,
    pub interval: String,
    pub ui: GatusUi,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<GatusClient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatusUi {
    pub hide_hostname: bool,
    pub hide_url: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatusClient {
    pub dns_resolver: String,
}

/// Build the endpoint document for an ingress.
///
/// Fails when neither an annotation nor the first rule supplies a host.
pub fn endpoint_for(ingress: &Ingress, dns_resolver: &str) -> Result<GatusConfig, PolicyError> {
    let annotations = ingress.metadata.annotations.clone().unwrap_or_default();
    let name = display_name(&ingress.metadata);

    let first_rule = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_ref())
        .and_then(|rules| rules.first());
    let rule_host = first_rule
        .and_then(|rule| rule.host.clone())
        .unwrap_or_default();
    let rule_path = first_rule
        .and_then(|rule| rule.http.as_ref())
        .and_then(|http| http.paths.first())
        .and_then(|path| path.path.clone())
        .unwrap_or_default();

    let host = string_value(annotations::GATUS_HOST, &annotations, &rule_host);
    if host.is_empty() {
        return Err(PolicyError::InvalidObject {
            kind: ResourceType::Ingress,
            name,
            reason: format!(
                "no rule host declared and no {} annotation",
                annotations::GATUS_HOST
            ),
        });
    }
    let path = string_value(annotations::GATUS_PATH, &annotations, &rule_path);

    let endpoint = GatusEndpoint {
        name: string_value(annotations::GATUS_NAME, &annotations, &name),
        group: string_value(annotations::GATUS_GROUP, &annotations, DEFAULT_GROUP),
        url: format!("{host}{path}"),
        interval: DEFAULT_INTERVAL.to_string(),
        ui: GatusUi {
            hide_hostname: true,
            hide_url: true,
        },
        conditions: conditions(&string_value(
            annotations::GATUS_CONDITIONS,
            &annotations,
            "",
        )),
        client: annotations::bool_value(annotations::GATUS_DNS, &annotations, false).then(|| {
            GatusClient {
                dns_resolver: dns_resolver.to_string(),
            }
        }),
    };

    Ok(GatusConfig {
        endpoints: vec![endpoint],
    })
}

/// Serialize a document into the text stored under [`CONFIG_KEY`].
pub fn to_yaml(config: &GatusConfig) -> Result<String, PolicyError> {
    serde_yaml::to_string(config).map_err(|e| PolicyError::Render {
        name: config
            .endpoints
            .first()
            .map(|e| e.name.clone())
            .unwrap_or_default(),
        message: e.to_string(),
    })
}

/// Render the full `config.yaml` text for an ingress.
pub fn render(ingress: &Ingress, dns_resolver: &str) -> Result<String, PolicyError> {
    to_yaml(&endpoint_for(ingress, dns_resolver)?)
}

fn conditions(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return vec![DEFAULT_CONDITION.to_string()];
    }
    raw.split(',').map(str::to_string).collect()
}
