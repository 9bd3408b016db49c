//! # Marketplace Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SOUQ_DATABASE_PATH=/var/lib/souq/souq.db                           │
//! │     SOUQ_STATUS_POLICY=strict                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     souq.toml                                                          │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     souq.db, SAR, free delivery, permissive status policy              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "souq.db"
//! max_connections = 5
//!
//! [pricing]
//! currency = "SAR"
//! delivery_fee = "0.00"
//!
//! [orders]
//! status_policy = "permissive"   # or "strict"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::DbConfig;
use souq_core::validation::{validate_currency, validate_delivery_fee};
use souq_core::{Money, StatusPolicy, DEFAULT_CURRENCY};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    "souq.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSettings {
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Flat fee added to every store order.
    #[serde(default)]
    pub delivery_fee: Money,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            currency: default_currency(),
            delivery_fee: Money::zero(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderSettings {
    #[serde(default)]
    pub status_policy: StatusPolicy,
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    #[serde(default)]
    pub orders: OrderSettings,
}

// =============================================================================
// Loading
// =============================================================================

impl MarketConfig {
    /// Loads defaults, then the file (when it exists), then environment
    /// overrides, and validates the result.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides_from(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies `SOUQ_*` overrides. `lookup` is `std::env::var` in production.
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("SOUQ_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = path;
        }

        if let Some(max) = lookup("SOUQ_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid SOUQ_MAX_CONNECTIONS"),
            }
        }

        if let Some(currency) = lookup("SOUQ_CURRENCY") {
            self.pricing.currency = currency.trim().to_uppercase();
        }

        if let Some(fee) = lookup("SOUQ_DELIVERY_FEE") {
            match fee.parse::<Money>() {
                Ok(fee) => self.pricing.delivery_fee = fee,
                Err(_) => warn!(value = %fee, "Ignoring invalid SOUQ_DELIVERY_FEE"),
            }
        }

        if let Some(policy) = lookup("SOUQ_STATUS_POLICY") {
            match policy.parse::<StatusPolicy>() {
                Ok(policy) => {
                    debug!(%policy, "Overriding status policy from environment");
                    self.orders.status_policy = policy;
                }
                Err(_) => warn!(value = %policy, "Ignoring unknown SOUQ_STATUS_POLICY"),
            }
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        validate_currency(&self.pricing.currency)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        validate_delivery_fee(self.pricing.delivery_fee)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        if self.database.path == ":memory:" {
            return DbConfig::in_memory();
        }
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }
}
