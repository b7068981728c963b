//! Mutating admission endpoint for pods.
//!
//! `POST /mutate` accepts an `admission.k8s.io/v1` AdmissionReview, runs the
//! pod policy chain and answers with a JSONPatch that removes every limit the
//! chain stripped. Dispatch failures fail open: the pod is admitted unchanged
//! and the failure is reported in the response status.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::{Container, Pod};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::Dispatcher;
use crate::resource::{display_name, Operation, Resource, ResourceType};

const API_VERSION: &str = "admission.k8s.io/v1";
const KIND: &str = "AdmissionReview";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub object: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
    /// Base64-encoded JSONPatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionStatus {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: String,
    pub path: String,
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/mutate", post(mutate))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(dispatcher)
}

async fn mutate(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(review): Json<AdmissionReview>,
) -> Json<AdmissionReview> {
    let response = match review.request {
        Some(request) => review_pod(&dispatcher, request).await,
        None => AdmissionResponse {
            allowed: true,
            status: Some(AdmissionStatus {
                message: "admission review carried no request".to_string(),
            }),
            ..Default::default()
        },
    };
    Json(AdmissionReview {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        request: None,
        response: Some(response),
    })
}

async fn review_pod(dispatcher: &Dispatcher, request: AdmissionRequest) -> AdmissionResponse {
    let mut response = AdmissionResponse {
        uid: request.uid.clone(),
        allowed: true,
        ..Default::default()
    };
    if request.operation == "DELETE" {
        return response;
    }

    let pod: Pod = match request.object.map(serde_json::from_value::<Pod>).transpose() {
        Ok(Some(pod)) => pod,
        Ok(None) => return response,
        Err(e) => {
            tracing::warn!(uid = %request.uid, error = %e, "admission object is not a pod");
            response.status = Some(AdmissionStatus {
                message: format!("object is not a pod: {e}"),
            });
            return response;
        }
    };

    let mut resource = Resource::Pod(pod.clone());
    if let Err(e) = dispatcher
        .apply_policies_by_type(ResourceType::Pod, &mut resource, Operation::Upsert)
        .await
    {
        tracing::error!(
            uid = %request.uid,
            pod = %display_name(&pod.metadata),
            namespace = ?request.namespace,
            error = %e,
            "pod policies failed, admitting unchanged"
        );
        response.status = Some(AdmissionStatus {
            message: e.to_string(),
        });
        return response;
    }

    let Some(mutated) = resource.as_pod() else {
        return response;
    };
    let ops = limit_removals(&pod, mutated);
    if ops.is_empty() {
        return response;
    }
    match serde_json::to_vec(&ops) {
        Ok(bytes) => {
            tracing::info!(
                uid = %request.uid,
                pod = %display_name(&pod.metadata),
                removals = ops.len(),
                "patching pod"
            );
            response.patch_type = Some("JSONPatch".to_string());
            response.patch = Some(STANDARD.encode(bytes));
        }
        Err(e) => {
            tracing::error!(uid = %request.uid, error = %e, "failed to encode patch");
        }
    }
    response
}

/// One `remove` op per limit key present in `before` but absent in `after`.
pub fn limit_removals(before: &Pod, after: &Pod) -> Vec<PatchOp> {
    let (Some(before), Some(after)) = (before.spec.as_ref(), after.spec.as_ref()) else {
        return Vec::new();
    };
    let mut ops = Vec::new();
    if let (Some(b), Some(a)) = (&before.init_containers, &after.init_containers) {
        container_removals("initContainers", b, a, &mut ops);
    }
    container_removals("containers", &before.containers, &after.containers, &mut ops);
    ops
}

fn container_removals(
    field: &str,
    before: &[Container],
    after: &[Container],
    ops: &mut Vec<PatchOp>,
) {
    for (index, (b, a)) in before.iter().zip(after).enumerate() {
        let Some(before_limits) = b.resources.as_ref().and_then(|r| r.limits.as_ref()) else {
            continue;
        };
        let after_limits = a.resources.as_ref().and_then(|r| r.limits.as_ref());
        for key in before_limits.keys() {
            if after_limits.map_or(true, |limits| !limits.contains_key(key)) {
                ops.push(PatchOp {
                    op: "remove".to_string(),
                    path: format!(
                        "/spec/{field}/{index}/resources/limits/{}",
                        escape_pointer(key)
                    ),
                });
            }
        }
    }
}

/// Escape a JSON-pointer reference token (RFC 6901).
fn escape_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
