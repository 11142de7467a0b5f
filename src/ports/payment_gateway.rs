//! Payment gateway port.
//!
//! Defines the contract for the hosted checkout provider: issuing orders
//! before checkout and reading back the authoritative payment record after.
//!
//! # Design
//!
//! - **Gateway is the source of truth** for status, amount and currency.
//!   Nothing the client submits besides ids and the signature is trusted.
//! - **Bounded**: implementations must enforce a request timeout.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::billing::{GatewayPayment, PaymentOrder, PlanKind};
use crate::domain::foundation::{PaymentId, UserId};

/// Port for the hosted payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Issue an order for `amount_minor` that the client then pays at checkout.
    ///
    /// The owning user is stored in the order notes so verification can
    /// detect a payment being replayed by a different account.
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        plan: PlanKind,
        user_id: &UserId,
    ) -> Result<PaymentOrder, GatewayError>;

    /// Fetch the gateway's record of a payment.
    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<GatewayPayment, GatewayError>;

    /// Public key id the client checkout widget needs.
    fn key_id(&self) -> &str;
}

/// Errors from talking to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No response within the configured timeout.
    #[error("gateway timed out: {0}")]
    Timeout(String),

    /// Connection-level failure.
    #[error("gateway network error: {0}")]
    Network(String),

    /// Gateway answered with a 5xx or rate limit.
    #[error("gateway unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// Gateway refused the request (4xx other than rate limit).
    #[error("gateway rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response body could not be understood.
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Returns true if the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout(_) | GatewayError::Network(_) | GatewayError::Unavailable { .. }
        )
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || status >= 500 {
            GatewayError::Unavailable { status, message }
        } else {
            GatewayError::Rejected { status, message }
        }
    }
}
