//! # Validation Module
//!
//! Input checks that run before any pricing or database work.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Request DTO (serde)                                          │
//! │  └── Types, enum values (payment_method ∈ cod|card|wallet)             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── quantity 1..=999, note ≤ 500 chars                                │
//! │  ├── shipping address is a non-empty JSON object                       │
//! │  └── coupon code normalisation                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  └── CHECK (quantity >= 1), UNIQUE (user_id, variant_id), FKs          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::Value;

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_ITEM_QUANTITY, MAX_NOTE_LENGTH, MAX_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart or order line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a variant price in minor units. Zero is allowed (free items).
///
/// Capped at MAX_PRICE_CENTS so that price × quantity stays in range.
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    if cents > MAX_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a per-order delivery fee.
pub fn validate_delivery_fee(fee: Money) -> ValidationResult<()> {
    if fee.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "delivery_fee".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates the optional customer note on a checkout.
pub fn validate_note(note: &str) -> ValidationResult<()> {
    if note.chars().count() > MAX_NOTE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: MAX_NOTE_LENGTH,
        });
    }

    Ok(())
}

/// Validates an ISO-4217 style currency code ("SAR", "USD").
pub fn validate_currency(code: &str) -> ValidationResult<()> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be three uppercase letters".to_string(),
        });
    }

    Ok(())
}

/// Normalises a coupon code for comparison: trimmed, uppercased.
///
/// Returns `None` for blank input, which means "no coupon".
///
/// ```rust
/// use souq_core::validation::normalize_coupon_code;
///
/// assert_eq!(normalize_coupon_code("  save10 "), Some("SAVE10".to_string()));
/// assert_eq!(normalize_coupon_code("   "), None);
/// ```
pub fn normalize_coupon_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_uppercase())
    }
}

/// Validates a UUID string.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Structured Validators
// =============================================================================

/// Validates an inline shipping address.
///
/// Any non-empty JSON object is accepted; the keys are stored verbatim in
/// the order's address snapshot.
pub fn validate_shipping_address(address: &Value) -> ValidationResult<()> {
    match address {
        Value::Object(map) if !map.is_empty() => Ok(()),
        Value::Object(_) => Err(ValidationError::Required {
            field: "shipping_address".to_string(),
        }),
        _ => Err(ValidationError::InvalidFormat {
            field: "shipping_address".to_string(),
            reason: "must be a JSON object".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_price_and_fee() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_price_cents(MAX_PRICE_CENTS).is_ok());
        assert!(matches!(
            validate_price_cents(i64::MAX / 2),
            Err(ValidationError::OutOfRange { .. })
        ));
        // the cap × the max quantity still fits
        assert!(MAX_PRICE_CENTS.checked_mul(MAX_ITEM_QUANTITY).is_some());
        assert!(validate_delivery_fee(Money::zero()).is_ok());
        assert!(validate_delivery_fee(Money::from_cents(-100)).is_err());
    }

    #[test]
    fn test_validate_note_counts_chars_not_bytes() {
        assert!(validate_note(&"a".repeat(500)).is_ok());
        assert!(validate_note(&"a".repeat(501)).is_err());
        // 500 two-byte characters is still 500 characters
        assert!(validate_note(&"ع".repeat(500)).is_ok());
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("SAR").is_ok());
        assert!(validate_currency("sar").is_err());
        assert!(validate_currency("SARR").is_err());
    }

    #[test]
    fn test_normalize_coupon_code() {
        assert_eq!(normalize_coupon_code("save10"), Some("SAVE10".to_string()));
        assert_eq!(normalize_coupon_code(" Save10\t"), Some("SAVE10".to_string()));
        assert_eq!(normalize_coupon_code(""), None);
    }

    #[test]
    fn test_validate_shipping_address() {
        assert!(validate_shipping_address(&json!({"city": "Riyadh"})).is_ok());
        assert!(matches!(
            validate_shipping_address(&json!({})),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_shipping_address(&json!("Riyadh")),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("address_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("address_id", "").is_err());
        assert!(validate_uuid("address_id", "not-a-uuid").is_err());
    }
}
