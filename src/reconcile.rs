//! Reconciliation adapter: turns an event notification into a dispatch call.
//!
//! event → fetch current object → (gone: done) | classify upsert/delete → dispatch
//!
//! A missing object is not an error; watch layers routinely deliver
//! notifications for objects that have since been removed.

use std::sync::Arc;

use crate::error::Result;
use crate::policy::dispatch::{DispatchReport, Dispatcher};
use crate::resource::{ObjectKey, Operation, ResourceType};
use crate::store::ObjectStore;

/// Outcome of reconciling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// The object no longer exists; nothing was dispatched.
    CacheMiss,
    Dispatched {
        operation: Operation,
        report: DispatchReport,
    },
}

pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    dispatcher: Arc<Dispatcher>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ObjectStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub async fn reconcile(
        &self,
        resource_type: ResourceType,
        key: &ObjectKey,
    ) -> Result<Reconciled> {
        tracing::info!(resource = %resource_type, object = %key, "reconciling");

        let mut resource = match self.store.fetch(resource_type, key).await {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                tracing::info!(resource = %resource_type, object = %key, "cache miss");
                return Ok(Reconciled::CacheMiss);
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(resource = %resource_type, object = %key, "cache miss");
                return Ok(Reconciled::CacheMiss);
            }
            Err(e) => {
                tracing::error!(
                    resource = %resource_type,
                    object = %key,
                    error = %e,
                    "failed to get object"
                );
                return Err(e.into());
            }
        };

        let operation = Operation::classify(resource.metadata());
        let report = self
            .dispatcher
            .apply_policies_by_type(resource_type, &mut resource, operation)
            .await?;
        Ok(Reconciled::Dispatched { operation, report })
    }
}
