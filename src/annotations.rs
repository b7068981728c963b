//! Annotation and label keys, plus typed lookups over annotation maps.
//!
//! Lookups never fail: an absent key is a normal case that falls back to the
//! caller's default.

use std::collections::BTreeMap;

/// Prefix shared by every annotation and label this controller owns.
pub const PREFIX: &str = "policy-control.aumer.io";

// ── Annotations ──

/// Opt-in toggle for Gatus endpoint generation (`"true"` / `"false"`).
pub const GATUS_GENERATE: &str = "policy-control.aumer.io/gatus-generate";
pub const GATUS_NAME: &str = "policy-control.aumer.io/gatus-name";
pub const GATUS_GROUP: &str = "policy-control.aumer.io/gatus-group";
pub const GATUS_HOST: &str = "policy-control.aumer.io/gatus-host";
pub const GATUS_PATH: &str = "policy-control.aumer.io/gatus-path";
/// Comma-separated list of Gatus conditions.
pub const GATUS_CONDITIONS: &str = "policy-control.aumer.io/gatus-conditions";
pub const GATUS_DNS: &str = "policy-control.aumer.io/gatus-dns";
/// Set to `"true"` on a pod to keep its CPU limits.
pub const KEEP_LIMITS: &str = "policy-control.aumer.io/keep-limits";

// ── Labels on generated artifacts ──

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = PREFIX;
pub const PARENT_UID_LABEL: &str = "policy-control.aumer.io/parent-uid";
pub const GATUS_ENABLED_LABEL: &str = "gatus.io/enabled";
pub const GATUS_ENABLED_VALUE: &str = "enabled";

/// Returns the annotation value if present, else `default` (which may be empty).
pub fn string_value(key: &str, annotations: &BTreeMap<String, String>, default: &str) -> String {
    match annotations.get(key) {
        Some(value) => value.clone(),
        None => default.to_string(),
    }
}

/// Returns `true` only for a present key whose value is exactly `"true"`.
///
/// A present key with any other value is `false` regardless of `default`;
/// `default` only applies when the key is absent.
pub fn bool_value(key: &str, annotations: &BTreeMap<String, String>, default: bool) -> bool {
    match annotations.get(key) {
        Some(value) => value == "true",
        None => default,
    }
}
