//! # Checkout DTOs
//!
//! Request and response shapes for placing orders from a cart.
//!
//! ```json
//! {
//!   "address_id": null,
//!   "shipping_address": {"city": "Riyadh", "street": "Olaya St"},
//!   "payment_method": "cod",
//!   "note": "leave at the door",
//!   "coupon_code": "save10"
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::cart::LineItem;
use crate::error::ValidationError;
use crate::order::{Order, OrderItem, PaymentMethod};
use crate::totals::OrderTotals;
use crate::validation::{
    normalize_coupon_code, validate_note, validate_shipping_address, validate_uuid,
    ValidationResult,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutRequest {
    /// A saved address of the customer.
    #[serde(default)]
    pub address_id: Option<String>,
    /// Inline address; wins over `address_id` when both are sent.
    #[serde(default)]
    #[ts(type = "Record<string, unknown> | null")]
    pub shipping_address: Option<Value>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// Where the shipping snapshot comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShippingSource<'a> {
    Inline(&'a Value),
    Saved(&'a str),
}

impl CheckoutRequest {
    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(address) = &self.shipping_address {
            validate_shipping_address(address)?;
        }
        if let Some(address_id) = &self.address_id {
            validate_uuid("address_id", address_id)?;
        }
        if self.shipping_address.is_none() && self.address_id.is_none() {
            return Err(ValidationError::Required {
                field: "address_id or shipping_address".to_string(),
            });
        }
        if let Some(note) = &self.note {
            validate_note(note)?;
        }
        Ok(())
    }

    pub fn shipping_source(&self) -> Option<ShippingSource<'_>> {
        match (&self.shipping_address, &self.address_id) {
            (Some(inline), _) => Some(ShippingSource::Inline(inline)),
            (None, Some(id)) => Some(ShippingSource::Saved(id)),
            (None, None) => None,
        }
    }

    /// Normalised coupon code, `None` when absent or blank.
    pub fn coupon(&self) -> Option<String> {
        self.coupon_code.as_deref().and_then(normalize_coupon_code)
    }

    /// Trimmed note; blank notes are dropped.
    pub fn note(&self) -> Option<&str> {
        self.note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty())
    }
}

/// One store's order as created by a checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
}

/// One store's share of a cart, priced but not placed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StoreQuote {
    pub store_id: String,
    pub items: Vec<LineItem>,
    pub totals: OrderTotals,
}
