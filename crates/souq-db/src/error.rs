//! # Error Types
//!
//! Storage errors and the service-level errors callers see.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          souq-core (CoreError)             │
//! │       │                                   │                             │
//! │       ▼                                   │                             │
//! │  DbError ← constraint category            │                             │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  ServiceError (checkout / pricing / orders)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  HTTP layer: is_client_error() → 4xx, otherwise 5xx                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use souq_core::{CoreError, ValidationError};
use thiserror::Error;

use crate::events::HookError;

// =============================================================================
// DbError
// =============================================================================

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Second cart row for the same (user, variant)
    /// - Duplicate coupon code (case-insensitive)
    /// - Coupon redeemed twice on one order
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Cart row for a variant that does not exist
    /// - Deleting a coupon a promotion still requires
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (negative price, zero quantity...).
    #[error("Constraint violation: {message}")]
    CheckViolation { message: String },

    /// Input rejected before reaching SQL.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Another connection holds the write lock.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored value could not be decoded (bad JSON, unknown enum).
    #[error("Corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn corrupt(entity: &'static str, id: impl Into<String>, reason: impl ToString) -> Self {
        DbError::Corrupt {
            entity,
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the error is a lost race for the write lock.
    pub fn is_busy(&self) -> bool {
        matches!(self, DbError::Busy(_))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type / lock
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite reports constraints and locks only through the message:
                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <expr>"
                // "database is locked" / "database table is locked"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("is locked") || msg.contains("database is busy") {
                    DbError::Busy(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// ServiceError
// =============================================================================

/// Errors returned by the checkout, pricing and order services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Address not found: {0}")]
    AddressNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// The cart was consumed by another checkout while this one ran.
    #[error("Cart changed during checkout, please retry")]
    ConcurrentCheckout,

    /// A status update lost a race with another update of the same order.
    #[error("Order {0} was changed by another request")]
    ConcurrentUpdate(String),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Core(CoreError),

    #[error(transparent)]
    Db(DbError),
}

impl ServiceError {
    /// True for errors caused by the request (4xx), false for server faults.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServiceError::Validation(_)
            | ServiceError::EmptyCart
            | ServiceError::AddressNotFound(_)
            | ServiceError::OrderNotFound(_)
            | ServiceError::ConcurrentCheckout
            | ServiceError::ConcurrentUpdate(_) => true,
            ServiceError::Core(err) => err.is_client_error(),
            ServiceError::Hook(_) | ServiceError::Db(_) => false,
        }
    }

    /// Turns a busy database into the caller's own conflict error.
    ///
    /// Checkout reports `ConcurrentCheckout`, order updates report
    /// `ConcurrentUpdate`. Everything else passes through.
    pub(crate) fn or_conflict(self, conflict: impl FnOnce() -> ServiceError) -> ServiceError {
        match self {
            ServiceError::Db(DbError::Busy(_)) => conflict(),
            other => other,
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => ServiceError::Validation(v),
            other => ServiceError::Core(other),
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Validation(v) => ServiceError::Validation(v),
            other => ServiceError::Db(other),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_split() {
        assert!(ServiceError::EmptyCart.is_client_error());
        assert!(ServiceError::ConcurrentCheckout.is_client_error());
        assert!(ServiceError::AddressNotFound("a".into()).is_client_error());
        assert!(!ServiceError::Db(DbError::PoolExhausted).is_client_error());
        assert!(!ServiceError::Hook(HookError::new("audit", "down")).is_client_error());

        let transition = CoreError::InvalidTransition {
            axis: "payment",
            from: "REFUNDED".into(),
            to: "PAID".into(),
        };
        assert!(ServiceError::from(transition).is_client_error());
    }

    #[test]
    fn test_busy_is_mapped_by_the_caller() {
        let err: ServiceError = DbError::Busy("database is locked".into()).into();
        assert!(matches!(err, ServiceError::Db(DbError::Busy(_))));
        assert!(!err.is_client_error());

        let checkout = err.or_conflict(|| ServiceError::ConcurrentCheckout);
        assert!(matches!(checkout, ServiceError::ConcurrentCheckout));

        let err: ServiceError = DbError::Busy("database is locked".into()).into();
        let update = err.or_conflict(|| ServiceError::ConcurrentUpdate("o1".into()));
        assert!(matches!(update, ServiceError::ConcurrentUpdate(id) if id == "o1"));

        let other = ServiceError::EmptyCart.or_conflict(|| ServiceError::ConcurrentCheckout);
        assert!(matches!(other, ServiceError::EmptyCart));
    }

    #[test]
    fn test_core_validation_is_flattened() {
        let err: ServiceError = CoreError::Validation(ValidationError::MustNotBeNegative {
            field: "delivery_fee".into(),
        })
        .into();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
