//! Structured logging and audit records.
//!
//! Every hardware object the next hop group layer creates or destroys is
//! reported through [`audit_log!`] as a JSON [`AuditRecord`], so operators can
//! correlate group ids with APPL_DB keys. Ordinary diagnostics go through the
//! source-tagged [`debug_log!`], [`info_log!`], [`warn_log!`] and
//! [`error_log!`] macros.
//!
//! # Severity mapping
//!
//! | Outcome    | Level |
//! |------------|-------|
//! | Success    | info  |
//! | InProgress | debug |
//! | Failure    | warn  |
//! | Denied     | warn  |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    ResourceCreate,
    ResourceModify,
    ResourceDelete,
    SystemLifecycle,
    SaiOperation,
    ErrorCondition,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::ResourceCreate => write!(f, "RESOURCE_CREATE"),
            AuditCategory::ResourceModify => write!(f, "RESOURCE_MODIFY"),
            AuditCategory::ResourceDelete => write!(f, "RESOURCE_DELETE"),
            AuditCategory::SystemLifecycle => write!(f, "SYSTEM_LIFECYCLE"),
            AuditCategory::SaiOperation => write!(f, "SAI_OPERATION"),
            AuditCategory::ErrorCondition => write!(f, "ERROR_CONDITION"),
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    /// Accepted but not complete yet (e.g. a temporary group).
    InProgress,
    /// Refused by policy (e.g. a delete of a referenced group).
    Denied,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Denied => write!(f, "denied"),
        }
    }
}

/// One audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Component emitting the record ("NhgOrch", "CbfNhgOrch").
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,
    /// Group index or SAI object id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Creates a record stamped with the current time; outcome starts as
    /// [`AuditOutcome::InProgress`].
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the error message and marks the outcome as Failure.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Debug-level logging with a source tag.
///
/// ```ignore
/// debug_log!("NhgOrch", index = %index, "message");
/// ```
#[macro_export]
macro_rules! debug_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::debug!(
            source = $source,
            $($arg)*
        )
    };
}

/// Info-level logging with a source tag.
#[macro_export]
macro_rules! info_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::info!(
            source = $source,
            $($arg)*
        )
    };
}

/// Warn-level logging with a source tag.
#[macro_export]
macro_rules! warn_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::warn!(
            source = $source,
            $($arg)*
        )
    };
}

/// Error-level logging with a source tag.
#[macro_export]
macro_rules! error_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::error!(
            source = $source,
            $($arg)*
        )
    };
}

/// Emits an [`AuditRecord`] on the `audit` target at a level derived from
/// its outcome.
///
/// ```ignore
/// audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, "NhgOrch", "create_nhg")
///     .with_outcome(AuditOutcome::Success)
///     .with_object_id("group1")
///     .with_object_type("next_hop_group"));
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure | $crate::audit::AuditOutcome::Denied => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs a JSON tracing subscriber. `RUST_LOG` overrides `log_level`.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .init();
}

/// Installs a human-readable tracing subscriber for interactive runs.
pub fn init_logging_pretty(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_audit_record_creation() {
        let record = AuditRecord::new(AuditCategory::ResourceCreate, "NhgOrch", "create_nhg")
            .with_outcome(AuditOutcome::Success)
            .with_object_id("group1")
            .with_object_type("next_hop_group");

        assert_eq!(record.category, AuditCategory::ResourceCreate);
        assert_eq!(record.source, "NhgOrch");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id, Some("group1".to_string()));
        assert_eq!(record.object_type, Some("next_hop_group".to_string()));
    }

    #[test]
    fn test_audit_record_with_error() {
        let record = AuditRecord::new(AuditCategory::ResourceDelete, "NhgOrch", "remove_nhg")
            .with_error("SAI operation failed: SAI_STATUS_FAILURE");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(
            record.error.as_deref(),
            Some("SAI operation failed: SAI_STATUS_FAILURE")
        );
    }

    #[test]
    fn test_audit_record_json() {
        let record = AuditRecord::new(AuditCategory::ResourceCreate, "CbfNhgOrch", "create_cbf_nhg")
            .with_outcome(AuditOutcome::InProgress)
            .with_details(serde_json::json!({ "members": ["group1", "group2"] }));

        let json = record.to_json();
        assert!(json.contains("RESOURCE_CREATE"));
        assert!(json.contains("\"in_progress\""));
        assert!(json.contains("\"members\":[\"group1\",\"group2\"]"));
        assert!(!json.contains("object_id"));
    }

    #[test]
    fn test_display() {
        assert_eq!(AuditCategory::ResourceModify.to_string(), "RESOURCE_MODIFY");
        assert_eq!(AuditOutcome::Denied.to_string(), "denied");
    }
}
