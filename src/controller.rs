//! Watch wiring: feeds ingress events from the kube runtime into the
//! [`Reconciler`]. Requeue-on-failure is decided here, by the runtime,
//! not by the policy chain.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, ResourceExt};

use crate::annotations::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::error::PolicyError;
use crate::reconcile::{Reconciled, Reconciler};
use crate::resource::{ObjectKey, ResourceType};

pub struct ControllerContext {
    pub reconciler: Reconciler,
    pub requeue_after: Duration,
}

async fn reconcile_ingress(
    ingress: Arc<Ingress>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, PolicyError> {
    let key = ObjectKey::new(ingress.namespace().unwrap_or_default(), ingress.name_any());
    match ctx.reconciler.reconcile(ResourceType::Ingress, &key).await? {
        Reconciled::CacheMiss => {
            tracing::debug!(object = %key, "ingress vanished before reconcile")
        }
        Reconciled::Dispatched { operation, report } => tracing::debug!(
            object = %key,
            %operation,
            applied = ?report.applied,
            halted_by = ?report.halted_by,
            "ingress reconciled"
        ),
    }
    Ok(Action::await_change())
}

fn error_policy(ingress: Arc<Ingress>, error: &PolicyError, ctx: Arc<ControllerContext>) -> Action {
    tracing::warn!(
        ingress = %ingress.name_any(),
        error = %error,
        requeue_secs = ctx.requeue_after.as_secs(),
        "reconcile failed, requeueing"
    );
    Action::requeue(ctx.requeue_after)
}

/// Selector for the config maps this controller generates.
pub fn owned_selector() -> String {
    format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}")
}

/// Watch ingresses in all namespaces until a shutdown signal arrives.
///
/// Generated config maps are watched too, so an artifact edited or deleted
/// out of band re-triggers its owning ingress.
pub async fn run(client: Client, ctx: Arc<ControllerContext>) {
    let ingresses: Api<Ingress> = Api::all(client.clone());
    let config_maps: Api<ConfigMap> = Api::all(client);
    tracing::info!("starting ingress controller");

    Controller::new(ingresses, watcher::Config::default())
        .owns(config_maps, watcher::Config::default().labels(&owned_selector()))
        .shutdown_on_signal()
        .run(reconcile_ingress, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(e) = result {
                tracing::debug!(error = %e, "controller event not reconciled");
            }
        })
        .await;

    tracing::info!("ingress controller stopped");
}
