//! Object-store port.
//!
//! Policies and the reconciliation adapter reach the cluster only through
//! [`ObjectStore`], so the same dispatch code runs against the API server
//! ([`cluster::KubeStore`]) or an in-process map ([`memory::MemoryStore`]).
//! Calls are not retried here; retry policy belongs to the event-delivery
//! layer.

pub mod cluster;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use thiserror::Error;

use crate::resource::{ObjectKey, Resource, ResourceType};

pub use self::cluster::KubeStore;
pub use self::memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("kube api: {0}")]
    Kube(#[from] kube::Error),

    #[error("backend: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Persistence trait for watched objects and generated artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    // ── Watched objects ──

    /// Fetch the current state of a watched object. `Ok(None)` means the
    /// object no longer exists; every other failure is an error.
    async fn fetch(
        &self,
        resource_type: ResourceType,
        key: &ObjectKey,
    ) -> Result<Option<Resource>, StoreError>;

    // ── Generated artifacts ──

    /// List config maps in `namespace` carrying every label in `labels`.
    async fn list_config_maps(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ConfigMap>, StoreError>;
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError>;
    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError>;
    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// Render a label map as a Kubernetes equality selector (`a=b,c=d`).
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
