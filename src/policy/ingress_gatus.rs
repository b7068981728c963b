//! Maintain a Gatus endpoint config map for each opted-in ingress.
//!
//! Per ingress the artifact moves between two states, no config map and
//! exactly one config map:
//!
//! | event                           | no artifact | artifact exists   |
//! |---------------------------------|-------------|-------------------|
//! | upsert, `gatus-generate=true`   | create      | update in place   |
//! | upsert, `gatus-generate=false`  | no-op       | delete            |
//! | delete                          | no-op       | delete            |
//!
//! Artifacts are found by the `parent-uid` label, never by name. If more than
//! one matches, the first by name is kept (upsert) and the rest are deleted.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use super::Policy;
use crate::annotations;
use crate::config::IngressGatusConfig;
use crate::error::{PolicyError, Result};
use crate::gatus;
use crate::render::{NameTemplate, NameVars};
use crate::resource::{display_name, Operation, Resource, ResourceType};
use crate::store::ObjectStore;

pub struct IngressGenerateGatus {
    store: Arc<dyn ObjectStore>,
    name_template: NameTemplate,
    dns_resolver: String,
}

impl IngressGenerateGatus {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        name_template: NameTemplate,
        dns_resolver: &str,
    ) -> Self {
        Self {
            store,
            name_template,
            dns_resolver: dns_resolver.to_string(),
        }
    }

    pub fn from_config(config: &IngressGatusConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let template = NameTemplate::compile(&config.name_template)?;
        Ok(Self::new(store, template, &config.dns_resolver))
    }

    fn ingress<'a>(&self, resource: &'a Resource) -> Result<&'a Ingress> {
        resource.as_ingress().ok_or_else(|| {
            PolicyError::type_mismatch(self.name(), ResourceType::Ingress, resource.resource_type())
        })
    }

    /// Config maps owned by `uid`, sorted by name.
    async fn owned_artifacts(&self, namespace: &str, uid: &str) -> Result<Vec<ConfigMap>> {
        let mut found = self.store.list_config_maps(namespace, &owner_labels(uid)).await?;
        found.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(found)
    }

    async fn create(&self, ingress: &Ingress, uid: &str, content: String) -> Result<()> {
        let namespace = ingress.metadata.namespace.clone().unwrap_or_default();
        let source = display_name(&ingress.metadata);
        let name = self.name_template.render(&NameVars {
            name: &source,
            namespace: &namespace,
        })?;

        tracing::info!(ingress = %source, config_map = %name, "creating gatus config map");
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name),
                namespace: Some(namespace),
                labels: Some(artifact_labels(uid)),
                owner_references: Some(vec![owner_reference(ingress, uid)]),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(gatus::CONFIG_KEY.to_string(), content)])),
            ..Default::default()
        };
        self.store.create_config_map(&config_map).await?;
        Ok(())
    }

    async fn update(&self, existing: &ConfigMap, content: String) -> Result<()> {
        let current = existing
            .data
            .as_ref()
            .and_then(|data| data.get(gatus::CONFIG_KEY));
        if current == Some(&content) {
            tracing::debug!(config_map = ?existing.metadata.name, "gatus config map up to date");
            return Ok(());
        }

        tracing::info!(config_map = ?existing.metadata.name, "updating gatus config map");
        let mut config_map = existing.clone();
        config_map
            .data
            .get_or_insert_with(BTreeMap::new)
            .insert(gatus::CONFIG_KEY.to_string(), content);
        self.store.update_config_map(&config_map).await?;
        Ok(())
    }

    async fn delete(&self, config_map: &ConfigMap) -> Result<()> {
        let namespace = config_map.metadata.namespace.as_deref().unwrap_or_default();
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        tracing::info!(namespace, config_map = name, "deleting gatus config map");
        match self.store.delete_config_map(namespace, name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(namespace, config_map = name, "config map already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Policy for IngressGenerateGatus {
    fn name(&self) -> &'static str {
        "Ingress Generate Gatus"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Ingress
    }

    /// Applicable when the generate annotation is explicitly `true` or `false`.
    async fn validate(&self, resource: &Resource) -> Result<bool> {
        let ingress = self.ingress(resource)?;
        match resource.annotations().get(annotations::GATUS_GENERATE).map(String::as_str) {
            Some("true") => Ok(true),
            Some("false") => {
                tracing::info!(
                    ingress = %display_name(&ingress.metadata),
                    "gatus generation explicitly disabled, removing any generated config map"
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply(&self, resource: &mut Resource, operation: Operation) -> Result<()> {
        let ingress = self.ingress(resource)?;
        let source = display_name(&ingress.metadata);
        let namespace = ingress.metadata.namespace.clone().unwrap_or_default();
        let uid = match ingress.metadata.uid.as_deref() {
            Some(uid) if !uid.is_empty() => uid.to_string(),
            _ => {
                return Err(PolicyError::InvalidObject {
                    kind: ResourceType::Ingress,
                    name: source,
                    reason: "missing uid".to_string(),
                })
            }
        };

        let generate =
            annotations::bool_value(annotations::GATUS_GENERATE, resource.annotations(), false);
        if operation == Operation::Delete || !generate {
            for config_map in self.owned_artifacts(&namespace, &uid).await? {
                self.delete(&config_map).await?;
            }
            return Ok(());
        }

        // Render before touching the store so a bad document leaves existing state alone.
        let content = gatus::render(ingress, &self.dns_resolver).map_err(|e| {
            tracing::error!(ingress = %source, error = %e, "error rendering gatus config");
            e
        })?;

        let existing = self.owned_artifacts(&namespace, &uid).await?;
        match existing.split_first() {
            None => self.create(ingress, &uid, content).await,
            Some((keep, extras)) => {
                if !extras.is_empty() {
                    let extra: Vec<_> = extras.iter().map(|cm| cm.metadata.name.clone()).collect();
                    tracing::warn!(
                        ingress = %source,
                        keep = ?keep.metadata.name,
                        extra = ?extra,
                        "multiple gatus config maps share one owner, deleting extras"
                    );
                    for extra in extras {
                        self.delete(extra).await?;
                    }
                }
                self.update(keep, content).await
            }
        }
    }
}

fn owner_labels(uid: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            annotations::MANAGED_BY_LABEL.to_string(),
            annotations::MANAGED_BY_VALUE.to_string(),
        ),
        (annotations::PARENT_UID_LABEL.to_string(), uid.to_string()),
    ])
}

fn artifact_labels(uid: &str) -> BTreeMap<String, String> {
    let mut labels = owner_labels(uid);
    labels.insert(
        annotations::GATUS_ENABLED_LABEL.to_string(),
        annotations::GATUS_ENABLED_VALUE.to_string(),
    );
    labels
}

fn owner_reference(ingress: &Ingress, uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: "networking.k8s.io/v1".to_string(),
        kind: "Ingress".to_string(),
        name: ingress.metadata.name.clone().unwrap_or_default(),
        uid: uid.to_string(),
        controller: Some(true),
        ..Default::default()
    }
}
