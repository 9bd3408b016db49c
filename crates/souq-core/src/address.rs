//! Saved customer addresses and the shipping snapshot they produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ts_rs::TS;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct UserAddress {
    pub id: String,
    pub user_id: String,
    pub label: Option<String>,
    pub city: String,
    pub street: String,
    pub landmark: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl UserAddress {
    /// The JSON stored on an order. Later edits to the address do not
    /// reach orders already placed.
    pub fn snapshot(&self) -> Value {
        json!({
            "label": self.label,
            "city": self.city,
            "street": self.street,
            "landmark": self.landmark,
            "latitude": self.latitude,
            "longitude": self.longitude,
        })
    }
}
