//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Payment gateway configuration (Razorpay-compatible API)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Public key id, also handed to the checkout widget
    #[serde(default)]
    pub key_id: String,

    /// Shared secret for API basic auth and checkout signatures
    pub key_secret: Option<SecretString>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// ISO 4217 code orders are issued in
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Upper bound on a single gateway call, in seconds
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,
}

impl PaymentConfig {
    /// Check if using gateway test keys
    pub fn is_test_mode(&self) -> bool {
        self.key_id.starts_with("rzp_test_")
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    /// Validate payment configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.key_id.trim().is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__KEY_ID"));
        }
        let secret_missing = self
            .key_secret
            .as_ref()
            .map(|s| s.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if secret_missing {
            return Err(ValidationError::MissingRequired("PAYMENT__KEY_SECRET"));
        }

        if !self.api_base_url.starts_with("https://") && !self.api_base_url.starts_with("http://") {
            return Err(ValidationError::InvalidGatewayUrl);
        }
        if production && !self.api_base_url.starts_with("https://") {
            return Err(ValidationError::GatewayUrlMustBeHttps);
        }
        if production && self.is_test_mode() {
            return Err(ValidationError::TestKeyInProduction);
        }

        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidCurrency(self.currency.clone()));
        }
        if self.gateway_timeout_secs == 0 || self.gateway_timeout_secs > 60 {
            return Err(ValidationError::InvalidGatewayTimeout);
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            key_secret: None,
            api_base_url: default_api_base_url(),
            currency: default_currency(),
            gateway_timeout_secs: default_gateway_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    crate::adapters::gateway::DEFAULT_API_BASE_URL.to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_gateway_timeout() -> u64 {
    10
}
