//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `INVOICE_BILLING` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use invoice_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod billing;
mod database;
mod error;
mod payment;
mod server;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

use crate::domain::billing::PlanCatalog;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Payment gateway credentials and limits
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Crediting and reconciliation
    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `INVOICE_BILLING` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `INVOICE_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `INVOICE_BILLING__PAYMENT__KEY_SECRET=...` -> `payment.key_secret = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("INVOICE_BILLING")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// The server refuses to start when the gateway secret is missing, since
    /// no signature could ever be checked.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate(self.is_production())?;
        if self.payment.currency != PlanCatalog::CURRENT.currency {
            return Err(ValidationError::InvalidCurrency(self.payment.currency.clone()));
        }
        self.billing.validate(self.payment.gateway_timeout())?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::RenewalPolicy;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "INVOICE_BILLING__DATABASE__URL",
        "INVOICE_BILLING__PAYMENT__KEY_ID",
        "INVOICE_BILLING__PAYMENT__KEY_SECRET",
        "INVOICE_BILLING__SERVER__PORT",
        "INVOICE_BILLING__SERVER__ENVIRONMENT",
        "INVOICE_BILLING__BILLING__RENEWAL_POLICY",
        "INVOICE_BILLING__BILLING__CLAIM_LEASE_SECS",
    ];

    fn set_minimal_env() {
        env::set_var("INVOICE_BILLING__DATABASE__URL", "postgresql://test@localhost/test");
        env::set_var("INVOICE_BILLING__PAYMENT__KEY_ID", "rzp_test_abc");
        env::set_var("INVOICE_BILLING__PAYMENT__KEY_SECRET", "test_secret");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn load_with(extra: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        set_minimal_env();
        for (key, value) in extra {
            env::set_var(key, value);
        }
        let result = AppConfig::load();
        clear_env();
        result
    }

    #[test]
    fn test_load_from_environment() {
        let config = load_with(&[]).unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.payment.key_id, "rzp_test_abc");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = load_with(&[]).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.payment.currency, "INR");
        assert_eq!(config.billing.renewal_policy, RenewalPolicy::ResetFromNow);
    }

    #[test]
    fn test_nested_overrides() {
        let config = load_with(&[
            ("INVOICE_BILLING__SERVER__PORT", "3000"),
            ("INVOICE_BILLING__BILLING__RENEWAL_POLICY", "extend_remaining"),
            ("INVOICE_BILLING__BILLING__CLAIM_LEASE_SECS", "300"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.billing.renewal_policy, RenewalPolicy::ExtendRemaining);
        assert_eq!(config.billing.claim_lease_secs, 300);
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("INVOICE_BILLING__DATABASE__URL", "postgresql://test@localhost/test");
        env::set_var("INVOICE_BILLING__PAYMENT__KEY_ID", "rzp_test_abc");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired("PAYMENT__KEY_SECRET"))
        ));
    }

    #[test]
    fn test_production_rejects_test_keys() {
        let config = load_with(&[("INVOICE_BILLING__SERVER__ENVIRONMENT", "production")]).unwrap();
        assert!(config.is_production());
        assert!(matches!(
            config.validate(),
            Err(ValidationError::TestKeyInProduction)
        ));
    }
}
