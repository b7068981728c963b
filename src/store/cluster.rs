//! API-server backed [`ObjectStore`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;

use super::{label_selector, ObjectStore, StoreError};
use crate::resource::{ObjectKey, Resource, ResourceType};

const CONFIG_MAP: &str = "ConfigMap";

pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a store from the ambient kubeconfig or in-cluster service account.
    pub async fn try_default() -> Result<Self, StoreError> {
        Ok(Self::new(Client::try_default().await?))
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_name(config_map: &ConfigMap) -> Result<&str, StoreError> {
    config_map
        .metadata
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("config map has no name")))
}

fn namespace_of(config_map: &ConfigMap) -> &str {
    config_map.metadata.namespace.as_deref().unwrap_or("default")
}

/// Map API status codes the engine reasons about onto typed store errors.
fn classify(err: kube::Error, kind: &'static str, name: String) -> StoreError {
    match &err {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound { kind, name },
        kube::Error::Api(response) if response.code == 409 => {
            StoreError::AlreadyExists { kind, name }
        }
        _ => StoreError::Kube(err),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn fetch(
        &self,
        resource_type: ResourceType,
        key: &ObjectKey,
    ) -> Result<Option<Resource>, StoreError> {
        let resource = match resource_type {
            ResourceType::Pod => {
                let api: Api<Pod> = Api::namespaced(self.client.clone(), &key.namespace);
                api.get_opt(&key.name).await?.map(Resource::Pod)
            }
            ResourceType::Ingress => {
                let api: Api<Ingress> = Api::namespaced(self.client.clone(), &key.namespace);
                api.get_opt(&key.name).await?.map(Resource::Ingress)
            }
        };
        Ok(resource)
    }

    async fn list_config_maps(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ConfigMap>, StoreError> {
        let params = ListParams::default().labels(&label_selector(labels));
        let list = self.config_maps(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError> {
        let name = object_name(config_map)?;
        let namespace = namespace_of(config_map);
        self.config_maps(namespace)
            .create(&PostParams::default(), config_map)
            .await
            .map_err(|e| classify(e, CONFIG_MAP, format!("{namespace}/{name}")))?;
        Ok(())
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<(), StoreError> {
        let name = object_name(config_map)?;
        let namespace = namespace_of(config_map);
        self.config_maps(namespace)
            .replace(name, &PostParams::default(), config_map)
            .await
            .map_err(|e| classify(e, CONFIG_MAP, format!("{namespace}/{name}")))?;
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.config_maps(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, CONFIG_MAP, format!("{namespace}/{name}")))?;
        Ok(())
    }
}
