//! # Error Types
//!
//! Domain error types for souq-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  souq-core (this file)                                                 │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  souq-db                                                               │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── ServiceError     - What checkout / order callers see              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → HTTP status        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pricing never fails because of a bad promotion: the engine skips it.
//! These errors are for caller mistakes and illegal state changes.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A status moved along an edge its state machine does not have.
    ///
    /// ## When This Occurs
    /// - `PAID → PENDING_PAYMENT`
    /// - `DELIVERED → PREPARING`
    /// - Any move out of a terminal status
    #[error("Invalid {axis} transition: {from} → {to}")]
    InvalidTransition {
        axis: &'static str,
        from: String,
        to: String,
    },

    /// Both axes are individually valid but the combination is refused by
    /// the strict status policy (e.g. REFUNDED while SHIPPED).
    #[error("Incoherent order status: payment {payment} with fulfillment {fulfillment}")]
    IncoherentStatus {
        payment: String,
        fulfillment: String,
    },

    /// Promotion type string not recognised.
    #[error("Unknown promotion type: {0}")]
    UnknownPromotionType(String),

    /// Offer type string not recognised.
    #[error("Unknown offer type: {0}")]
    UnknownOfferType(String),

    /// Offer configuration does not match its declared type.
    #[error("Invalid configuration for offer {offer_id}: {reason}")]
    InvalidOfferConfig { offer_id: String, reason: String },

    /// Unknown status policy name in configuration.
    #[error("Unknown status policy: {0}")]
    UnknownStatusPolicy(String),

    /// Amount does not fit in i64 minor units.
    #[error("Monetary amount out of range: {0}")]
    MoneyOutOfRange(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns true when the caller sent something wrong (4xx), as opposed to
    /// a broken invariant on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidTransition { .. }
                | CoreError::IncoherentStatus { .. }
                | CoreError::MoneyOutOfRange(_)
                | CoreError::Validation(_)
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, non-object JSON).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
