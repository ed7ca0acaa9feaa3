//! # CLI Error Type
//!
//! Unified error type for commands. Every failure is printed as JSON:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "REJECTED",
//!     "message": "Cannot return 4 12kg cylinders: customer holds only 3"
//!   }
//! }
//! ```
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ValidationError ─► CoreError ─► DbError ─┬─────────────► CliError     │
//! │                                           └─► SyncError ─► CliError     │
//! │                                                                         │
//! │  NotFound / CustomerNotFound / ProductNotFound   ─► NOT_FOUND          │
//! │  Validation / InvalidAmount / UniqueViolation    ─► VALIDATION_ERROR   │
//! │  WrongPassword                                   ─► UNAUTHORIZED       │
//! │  other ledger refusals                           ─► REJECTED           │
//! │  storage failures                                ─► DATABASE_ERROR     │
//! │  replication failures                            ─► SYNC_ERROR         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use gaspro_core::CoreError;
use gaspro_db::DbError;
use gaspro_sync::SyncError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CliError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    /// A ledger rule refused the operation; nothing was written.
    Rejected,
    Unauthorized,
    DatabaseError,
    SyncError,
    Internal,
}

impl CliError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        CliError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        CliError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CliError::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CliError::new(ErrorCode::Internal, message)
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self.code {
            ErrorCode::NotFound | ErrorCode::ValidationError | ErrorCode::Unauthorized => 2,
            ErrorCode::Rejected => 3,
            _ => 1,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let code = match err {
            CoreError::CustomerNotFound(_) | CoreError::ProductNotFound(_) => ErrorCode::NotFound,
            CoreError::Validation(_)
            | CoreError::InvalidAmount { .. }
            | CoreError::QuantityTooLarge { .. } => ErrorCode::ValidationError,
            CoreError::WrongPassword => ErrorCode::Unauthorized,
            _ => ErrorCode::Rejected,
        };
        CliError::new(code, err.to_string())
    }
}

impl From<DbError> for CliError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Rejected(e) => CliError::from(e),
            DbError::NotFound { entity, id } => CliError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => {
                CliError::validation(format!("{} '{}' already exists", field, value))
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                CliError::validation("Invalid reference")
            }
            DbError::Serialization(e) => CliError::internal(e.to_string()),
            other => {
                // Log the detail; the operator gets the category
                tracing::error!("Database operation failed: {}", other);
                CliError::new(ErrorCode::DatabaseError, other.to_string())
            }
        }
    }
}

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Database(e) => CliError::from(e),
            other => CliError::new(ErrorCode::SyncError, other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::validation(format!("Invalid JSON: {}", err))
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for CliError {}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use gaspro_core::ValidationError;

    #[test]
    fn test_rejections_keep_their_category() {
        let err = CliError::from(DbError::Rejected(CoreError::InsufficientCylinders {
            product: "12kg".into(),
            holding: 3,
            requested: 4,
        }));
        assert_eq!(err.code, ErrorCode::Rejected);
        assert!(err.message.contains("holds only 3"));
        assert_eq!(err.exit_code(), 3);

        let err = CliError::from(DbError::from(ValidationError::Required {
            field: "name".into(),
        }));
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err = CliError::from(DbError::Rejected(CoreError::WrongPassword));
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }

    #[test]
    fn test_sync_errors() {
        let err = CliError::from(SyncError::SyncDisabled);
        assert_eq!(err.code, ErrorCode::SyncError);

        let err = CliError::from(SyncError::Database(DbError::not_found("Customer", "c-1")));
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(CliError::not_found("Invoice", "i-9")).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Invoice not found: i-9");
    }
}
