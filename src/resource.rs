//! Resource kinds the policy engine routes on.
//!
//! `Resource` is a closed sum over the watched kinds so that routing is an
//! exhaustive match instead of a runtime downcast.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Class of cluster object a policy targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Pod,
    Ingress,
}

impl ResourceType {
    pub const ALL: [ResourceType; 2] = [ResourceType::Pod, ResourceType::Ingress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Ingress => "Ingress",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pod" | "pods" => Ok(Self::Pod),
            "ingress" | "ingresses" => Ok(Self::Ingress),
            _ => Err(PolicyError::UnknownResourceType(s.to_string())),
        }
    }
}

/// Whether an event creates/updates its object or removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upsert,
    Delete,
}

impl Operation {
    /// `Delete` iff the object carries a deletion timestamp.
    pub fn classify(meta: &ObjectMeta) -> Self {
        if meta.deletion_timestamp.is_some() {
            Self::Delete
        } else {
            Self::Upsert
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upsert => f.write_str("upsert"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Namespaced identity of a watched object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A watched cluster object.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Pod(Pod),
    Ingress(Ingress),
}

impl Resource {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Pod(_) => ResourceType::Pod,
            Self::Ingress(_) => ResourceType::Ingress,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Pod(pod) => &pod.metadata,
            Self::Ingress(ingress) => &ingress.metadata,
        }
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        self.metadata().annotations.as_ref().unwrap_or(&EMPTY)
    }

    /// Name, or the generate-name prefix for objects not yet named.
    pub fn display_name(&self) -> String {
        display_name(self.metadata())
    }

    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    pub fn as_pod(&self) -> Option<&Pod> {
        match self {
            Self::Pod(pod) => Some(pod),
            _ => None,
        }
    }

    pub fn as_pod_mut(&mut self) -> Option<&mut Pod> {
        match self {
            Self::Pod(pod) => Some(pod),
            _ => None,
        }
    }

    pub fn as_ingress(&self) -> Option<&Ingress> {
        match self {
            Self::Ingress(ingress) => Some(ingress),
            _ => None,
        }
    }
}

impl From<Pod> for Resource {
    fn from(pod: Pod) -> Self {
        Self::Pod(pod)
    }
}

impl From<Ingress> for Resource {
    fn from(ingress: Ingress) -> Self {
        Self::Ingress(ingress)
    }
}

pub fn display_name(meta: &ObjectMeta) -> String {
    match meta.name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => meta.generate_name.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(meta: serde_json::Value) -> Pod {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": meta
        }))
        .unwrap()
    }

    #[test]
    fn parses_known_kinds() {
        assert_eq!("pod".parse::<ResourceType>().unwrap(), ResourceType::Pod);
        assert_eq!("Ingress".parse::<ResourceType>().unwrap(), ResourceType::Ingress);
        assert!(matches!(
            "service".parse::<ResourceType>(),
            Err(PolicyError::UnknownResourceType(s)) if s == "service"
        ));
    }

    #[test]
    fn classify_uses_deletion_timestamp() {
        let live = pod(json!({ "name": "web" }));
        assert_eq!(Operation::classify(&live.metadata), Operation::Upsert);

        let terminating = pod(json!({
            "name": "web",
            "deletionTimestamp": "2024-05-01T10:00:00Z"
        }));
        assert_eq!(Operation::classify(&terminating.metadata), Operation::Delete);
    }

    #[test]
    fn display_name_falls_back_to_generate_name() {
        let named = Resource::Pod(pod(json!({ "name": "web", "generateName": "web-" })));
        assert_eq!(named.display_name(), "web");

        let generated = Resource::Pod(pod(json!({ "name": "", "generateName": "web-" })));
        assert_eq!(generated.display_name(), "web-");
    }

    #[test]
    fn object_keys_order_by_namespace_then_name() {
        let mut keys = vec![
            ObjectKey::new("b", "a"),
            ObjectKey::new("a", "z"),
            ObjectKey::new("a", "b"),
        ];
        keys.sort();
        assert_eq!(
            keys.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["a/b", "a/z", "b/a"]
        );
    }

    #[test]
    fn accessors_respect_the_variant() {
        let mut resource = Resource::Pod(pod(json!({ "name": "web", "namespace": "apps" })));
        assert_eq!(resource.resource_type(), ResourceType::Pod);
        assert_eq!(resource.namespace(), "apps");
        assert!(resource.as_ingress().is_none());
        assert!(resource.as_pod_mut().is_some());
        assert!(resource.annotations().is_empty());
    }
}
