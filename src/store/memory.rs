//! In-memory [`ObjectStore`] for tests and offline runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;

use super::{ObjectStore, StoreError};
use crate::resource::{ObjectKey, Resource, ResourceType};

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Fetch,
    List,
    Create,
    Update,
    Delete,
}

/// Failure injected for a [`StoreOp`].
#[derive(Debug, Clone)]
enum Failure {
    Backend(String),
    NotFound,
}

type ResourceKey = (ResourceType, ObjectKey);

/// In-memory store keyed by namespace/name.
///
/// Config map creation rejects duplicate names the way the API server does,
/// and every successful write bumps [`MemoryStore::write_count`].
#[derive(Default)]
pub struct MemoryStore {
    resources: RwLock<HashMap<ResourceKey, Resource>>,
    config_maps: RwLock<BTreeMap<ObjectKey, ConfigMap>>,
    failures: RwLock<HashMap<StoreOp, Failure>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a watched object.
    pub fn put_resource(&self, resource: Resource) -> Result<(), StoreError> {
        let key = ObjectKey::new(resource.namespace(), resource.display_name());
        let mut resources = self.resources.write().map_err(|e| anyhow!("Lock: {}", e))?;
        resources.insert((resource.resource_type(), key), resource);
        Ok(())
    }

    pub fn remove_resource(
        &self,
        resource_type: ResourceType,
        key: &ObjectKey,
    ) -> Result<(), StoreError> {
        let mut resources = self.resources.write().map_err(|e| anyhow!("Lock: {}", e))?;
        resources.remove(&(resource_type, key.clone()));
        Ok(())
    }

    /// Snapshot of every stored config map, ordered by namespace/name.
    pub fn config_maps(&self) -> Vec<ConfigMap> {
        self.config_maps
            .read()
            .map(|maps| maps.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of successful create/update/delete calls on config maps.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent call of `op` fail with a backend error.
    pub fn fail_on(&self, op: StoreOp, message: &str) {
        self.inject(op, Failure::Backend(message.to_string()));
    }

    /// Make every subsequent call of `op` report its target as missing, as the
    /// API server does when a concurrent writer removed it first.
    pub fn fail_on_not_found(&self, op: StoreOp) {
        self.inject(op, Failure::NotFound);
    }

    fn inject(&self, op: StoreOp, failure: Failure) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert(op, failure);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.write() {
            failures.clear();
        }
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        let failures = self.failures.read().map_err(|e| anyhow!("Lock: {}", e))?;
        match failures.get(&op) {
            Some(Failure::Backend(message)) => Err(StoreError::Backend(anyhow!("{message}"))),
            Some(Failure::NotFound) => Err(StoreError::NotFound {
                kind: "object",
                name: format!("{op:?} target"),
            }),
            None => Ok(()),
        }
    }
}

fn config_map_key(config_map: &ConfigMap) -> Result<ObjectKey, StoreError> {
    let name = config_map.metadata.name.clone().unwrap_or_default();
    if name.is_empty() {
        return Err(StoreError::Backend(anyhow!("config map has no name")));
    }
    let namespace = config_map
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());
    Ok(ObjectKey::new(namespace, name))
}

fn matches_labels(config_map: &ConfigMap, wanted: &BTreeMap<String, String>) -> bool {
    let labels = config_map.metadata.labels.as_ref();
    wanted
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch(
        &self,
        resource_type: ResourceType,
        key: &ObjectKey,
    ) -> Result<Option<Resource>, StoreError> {
        self.check(StoreOp::Fetch)?;
        let resources = self.resources.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(resources.get(&(resource_type, key.clone())).cloned())
    }

    async fn list_config_maps(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ConfigMap>, StoreError> {
        self.check(StoreOp::List)?;
        let maps = self.config_maps.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(maps
            .iter()
            .filter(|(key, cm)| key.namespace == namespace && matches_labels(cm, labels))
            .map(|(_, cm)| cm.clone())
            .collect())
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError> {
        self.check(StoreOp::Create)?;
        let key = config_map_key(config_map)?;
        let mut maps = self.config_maps.write().map_err(|e| anyhow!("Lock: {}", e))?;
        if maps.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: "ConfigMap",
                name: key.to_string(),
            });
        }
        maps.insert(key, config_map.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError> {
        self.check(StoreOp::Update)?;
        let key = config_map_key(config_map)?;
        let mut maps = self.config_maps.write().map_err(|e| anyhow!("Lock: {}", e))?;
        match maps.get_mut(&key) {
            Some(existing) => {
                *existing = config_map.clone();
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "ConfigMap",
                name: key.to_string(),
            }),
        }
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.check(StoreOp::Delete)?;
        let key = ObjectKey::new(namespace, name);
        let mut maps = self.config_maps.write().map_err(|e| anyhow!("Lock: {}", e))?;
        match maps.remove(&key) {
            Some(_) => {
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "ConfigMap",
                name: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_map(name: &str, uid: &str) -> ConfigMap {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": name,
                "namespace": "apps",
                "labels": { "owner": uid }
            },
            "data": { "config.yaml": "x" }
        }))
        .unwrap()
    }

    fn owner(uid: &str) -> BTreeMap<String, String> {
        [("owner".to_string(), uid.to_string())].into_iter().collect()
    }

    #[tokio::test]
    async fn list_filters_by_namespace_and_labels() {
        let store = MemoryStore::new();
        store.create_config_map(&config_map("a", "u1")).await.unwrap();
        store.create_config_map(&config_map("b", "u2")).await.unwrap();

        let found = store.list_config_maps("apps", &owner("u1")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.name.as_deref(), Some("a"));

        assert!(store.list_config_maps("other", &owner("u1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = MemoryStore::new();
        store.create_config_map(&config_map("a", "u1")).await.unwrap();
        let err = store.create_config_map(&config_map("a", "u1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.delete_config_map("apps", "ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn injected_failures_surface_as_backend_errors() {
        let store = MemoryStore::new();
        store.fail_on(StoreOp::List, "connection reset");
        let err = store.list_config_maps("apps", &owner("u1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(err.to_string().contains("connection reset"));

        store.clear_failures();
        assert!(store.list_config_maps("apps", &owner("u1")).await.is_ok());
    }

    #[tokio::test]
    async fn injected_not_found_is_typed() {
        let store = MemoryStore::new();
        store.create_config_map(&config_map("a", "u1")).await.unwrap();
        store.fail_on_not_found(StoreOp::Delete);

        let err = store.delete_config_map("apps", "a").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.config_maps().len(), 1);
    }

    #[tokio::test]
    async fn config_maps_are_listed_by_namespace_then_name() {
        let store = MemoryStore::new();
        let mut other = config_map("a", "u1");
        other.metadata.namespace = Some("zeta".to_string());
        store.create_config_map(&other).await.unwrap();
        store.create_config_map(&config_map("b", "u1")).await.unwrap();
        store.create_config_map(&config_map("a", "u1")).await.unwrap();

        let keys: Vec<_> = store
            .config_maps()
            .iter()
            .map(|cm| {
                format!(
                    "{}/{}",
                    cm.metadata.namespace.as_deref().unwrap_or_default(),
                    cm.metadata.name.as_deref().unwrap_or_default()
                )
            })
            .collect();
        assert_eq!(keys, vec!["apps/a", "apps/b", "zeta/a"]);
    }
}
