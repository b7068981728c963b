//! policy-control: cluster-wide mutation policies for Kubernetes
//!
//! Observed resources flow through an ordered, type-routed policy chain:
//!
//! event → [`reconcile::Reconciler`] fetches + classifies →
//! [`policy::Dispatcher`] runs validate/apply per policy →
//! side effects through [`store::ObjectStore`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use policy_control::config::Config;
//! use policy_control::policy::build_dispatcher;
//! use policy_control::store::{MemoryStore, ObjectStore};
//!
//! let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
//! let dispatcher = build_dispatcher(&Config::default(), store).unwrap();
//! assert_eq!(dispatcher.registry().len(), 2);
//! ```

// Core error handling
pub mod error;

pub mod annotations;
pub mod config;
pub mod gatus;
pub mod policy;
pub mod reconcile;
pub mod render;
pub mod resource;
pub mod store;

// Cluster-facing surfaces
pub mod controller;
pub mod webhook;

pub use config::Config;
pub use error::{PolicyError, Result};
pub use policy::{build_dispatcher, Dispatcher, Policy, PolicyRegistry};
pub use reconcile::{Reconciled, Reconciler};
pub use resource::{ObjectKey, Operation, Resource, ResourceType};
pub use store::{ObjectStore, StoreError};
