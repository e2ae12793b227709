//! Structured adapter outcomes.
//!
//! Every adapter returns a loosely-typed record with a status field, a
//! human-readable message, and adapter-specific detail fields. Expected
//! alternate outcomes (resource exists, crawler running, object missing)
//! get their own status values so callers never have to parse messages.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AdapterError;

/// Closed set of adapter statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The adapter did what it was asked to do.
    Ok,
    /// A prerequisite object or resource does not exist.
    NotFound,
    /// The crawler was already running; nothing was started.
    AlreadyRunning,
    /// The resource already exists; nothing was created.
    AlreadyExists,
    /// The adapter failed; `message` carries the reason.
    Failed,
}

/// Result of a provisioning call wrapper.
///
/// Replaces the exception-as-control-flow pattern of catching a specific
/// "already exists" fault: the wrapper classifies that fault itself and
/// every other error stays an `Err`. `T` carries identifiers of the newly
/// created resource (ARN, DNS name) where the caller reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned<T = ()> {
    /// The resource was created by this call.
    Created(T),
    /// The resource already existed; the call changed nothing.
    AlreadyExists,
}

impl<T> Provisioned<T> {
    pub fn already_exists(&self) -> bool {
        matches!(self, Provisioned::AlreadyExists)
    }
}

/// Loosely-typed adapter result record.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Outcome {
    pub fn new(status: OutcomeStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Ok, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::NotFound, message)
    }

    pub fn already_running(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::AlreadyRunning, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::AlreadyExists, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Failed, message)
    }

    /// Build a failure outcome from an adapter error's display chain.
    pub fn from_error(err: &AdapterError) -> Self {
        Self::failed(err.chain())
    }

    /// Attach a detail field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// True unless the adapter failed.
    pub fn is_success(&self) -> bool {
        self.status != OutcomeStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_flat() {
        let outcome = Outcome::ok("copied")
            .with("bucket", "results")
            .with("key", "ml_data.csv");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["message"], "copied");
        assert_eq!(json["bucket"], "results");
        assert_eq!(json["key"], "ml_data.csv");
    }

    #[test]
    fn test_alternate_statuses_are_not_failures() {
        assert!(Outcome::already_exists("have one").is_success());
        assert!(Outcome::already_running("busy").is_success());
        assert!(Outcome::not_found("no object").is_success());
        assert!(!Outcome::failed("boom").is_success());
    }
}
