//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Gateway API base URL must use HTTPS in production")]
    GatewayUrlMustBeHttps,

    #[error("Invalid gateway API base URL")]
    InvalidGatewayUrl,

    #[error("Gateway test keys cannot be used in production")]
    TestKeyInProduction,

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Gateway timeout must be between 1 and 60 seconds")]
    InvalidGatewayTimeout,

    #[error("Entitlement write attempts must be between 1 and 10")]
    InvalidWriteAttempts,

    #[error("Entitlement store timeout must be between 1 and 60000 milliseconds")]
    InvalidStoreTimeout,

    #[error("Claim lease must exceed the gateway timeout plus the worst-case credit time")]
    ClaimLeaseTooShort,

    #[error("Reconcile interval must be at least 1 second")]
    InvalidReconcileInterval,
}
