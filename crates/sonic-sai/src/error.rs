//! SAI error types and status handling.
//!
//! Bulk next-hop-group calls report one status per entry, so every per-entry
//! result is a [`SaiResult`] in its own right.

use std::fmt;
use thiserror::Error;

/// SAI status codes that next-hop-group programming can observe.
///
/// Values correspond to `sai_status_t`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaiStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    NoMemory = -3,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    TableFull = -13,
    ObjectInUse = -17,
    InvalidObjectId = -19,
    NotExecuted = -23,
}

impl SaiStatus {
    /// Unknown codes collapse to [`SaiStatus::Failure`].
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => SaiStatus::Success,
            -2 => SaiStatus::NotSupported,
            -3 => SaiStatus::NoMemory,
            -4 => SaiStatus::InsufficientResources,
            -5 => SaiStatus::InvalidParameter,
            -6 => SaiStatus::ItemAlreadyExists,
            -7 => SaiStatus::ItemNotFound,
            -13 => SaiStatus::TableFull,
            -17 => SaiStatus::ObjectInUse,
            -19 => SaiStatus::InvalidObjectId,
            -23 => SaiStatus::NotExecuted,
            _ => SaiStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == SaiStatus::Success
    }

    pub fn into_result(self) -> SaiResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(SaiError::from_status(self))
        }
    }
}

impl fmt::Display for SaiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaiStatus::Success => "SAI_STATUS_SUCCESS",
            SaiStatus::Failure => "SAI_STATUS_FAILURE",
            SaiStatus::NotSupported => "SAI_STATUS_NOT_SUPPORTED",
            SaiStatus::NoMemory => "SAI_STATUS_NO_MEMORY",
            SaiStatus::InsufficientResources => "SAI_STATUS_INSUFFICIENT_RESOURCES",
            SaiStatus::InvalidParameter => "SAI_STATUS_INVALID_PARAMETER",
            SaiStatus::ItemAlreadyExists => "SAI_STATUS_ITEM_ALREADY_EXISTS",
            SaiStatus::ItemNotFound => "SAI_STATUS_ITEM_NOT_FOUND",
            SaiStatus::TableFull => "SAI_STATUS_TABLE_FULL",
            SaiStatus::ObjectInUse => "SAI_STATUS_OBJECT_IN_USE",
            SaiStatus::InvalidObjectId => "SAI_STATUS_INVALID_OBJECT_ID",
            SaiStatus::NotExecuted => "SAI_STATUS_NOT_EXECUTED",
        };
        write!(f, "{}", s)
    }
}

/// Error type for SAI operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaiError {
    #[error("SAI operation failed: {status}")]
    Status { status: SaiStatus },

    #[error("Feature not supported: {feature}")]
    NotSupported { feature: String },

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Item not found: {item}")]
    NotFound { item: String },

    #[error("Table full: {table}")]
    TableFull { table: String },

    #[error("Object in use: {object}")]
    ObjectInUse { object: String },
}

impl SaiError {
    pub fn from_status(status: SaiStatus) -> Self {
        match status {
            SaiStatus::NotSupported => SaiError::NotSupported {
                feature: "unknown".to_string(),
            },
            SaiStatus::InvalidParameter | SaiStatus::InvalidObjectId => {
                SaiError::InvalidParameter {
                    message: format!("SAI returned {}", status),
                }
            }
            SaiStatus::ItemNotFound => SaiError::NotFound {
                item: "unknown".to_string(),
            },
            SaiStatus::TableFull => SaiError::TableFull {
                table: "unknown".to_string(),
            },
            SaiStatus::ObjectInUse => SaiError::ObjectInUse {
                object: "unknown".to_string(),
            },
            _ => SaiError::Status { status },
        }
    }

    pub fn not_supported(feature: impl Into<String>) -> Self {
        SaiError::NotSupported {
            feature: feature.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        SaiError::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn not_found(item: impl Into<String>) -> Self {
        SaiError::NotFound { item: item.into() }
    }

    pub fn table_full(table: impl Into<String>) -> Self {
        SaiError::TableFull {
            table: table.into(),
        }
    }

    pub fn object_in_use(object: impl Into<String>) -> Self {
        SaiError::ObjectInUse {
            object: object.into(),
        }
    }

    /// Returns true for transient conditions worth retrying on the next drive.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SaiError::TableFull { .. }
                | SaiError::Status {
                    status: SaiStatus::InsufficientResources
                        | SaiStatus::NoMemory
                        | SaiStatus::NotExecuted
                }
        )
    }
}

/// Result type for SAI operations.
pub type SaiResult<T> = Result<T, SaiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_into_result() {
        assert!(SaiStatus::Success.into_result().is_ok());
        assert!(SaiStatus::Failure.into_result().is_err());
    }

    #[test]
    fn test_status_from_raw() {
        assert_eq!(SaiStatus::from_raw(0), SaiStatus::Success);
        assert_eq!(SaiStatus::from_raw(-7), SaiStatus::ItemNotFound);
        assert_eq!(SaiStatus::from_raw(-999), SaiStatus::Failure);
    }

    #[test]
    fn test_error_from_status() {
        let err = SaiError::from_status(SaiStatus::ItemNotFound);
        assert!(matches!(err, SaiError::NotFound { .. }));

        let err = SaiError::from_status(SaiStatus::TableFull);
        assert!(matches!(err, SaiError::TableFull { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SaiStatus::ObjectInUse.to_string(), "SAI_STATUS_OBJECT_IN_USE");
        assert_eq!(
            SaiError::from_status(SaiStatus::Failure).to_string(),
            "SAI operation failed: SAI_STATUS_FAILURE"
        );
    }
}
