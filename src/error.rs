//! Error types for policy dispatch
//!
//! Dispatch failures surface as reconciliation failures; the event-delivery
//! layer decides whether and when to retry them.

use thiserror::Error;

use crate::resource::ResourceType;
use crate::store::StoreError;

/// Main error type for policy validation and application
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("policy '{policy}' expects a {expected} but got a {found}")]
    TypeMismatch {
        policy: String,
        expected: ResourceType,
        found: ResourceType,
    },

    #[error("unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("invalid {kind} '{name}': {reason}")]
    InvalidObject {
        kind: ResourceType,
        name: String,
        reason: String,
    },

    #[error("rendering failed for '{name}': {message}")]
    Render { name: String, message: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PolicyError {
    pub fn type_mismatch(policy: &str, expected: ResourceType, found: ResourceType) -> Self {
        Self::TypeMismatch {
            policy: policy.to_string(),
            expected,
            found,
        }
    }

    /// True for failures that originate in the object store rather than in
    /// the policy chain itself.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
