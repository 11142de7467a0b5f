//! Razorpay-style gateway adapter.
//!
//! Implements the `PaymentGateway` port over the gateway's REST API:
//! - `POST /v1/orders` to issue an order
//! - `GET /v1/payments/{id}` to read back a payment
//!
//! # Security
//!
//! - Basic auth with `key_id:key_secret`
//! - Secret held in `secrecy::SecretString`, never logged
//! - Every request bounded by the client timeout

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::billing::{GatewayPayment, GatewayStatus, PaymentOrder, PlanKind};
use crate::domain::foundation::{OrderId, PaymentId, Timestamp, UserId};
use crate::ports::{GatewayError, PaymentGateway};

/// Default API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.razorpay.com";

/// Connection settings for the gateway client.
#[derive(Clone)]
pub struct GatewayClientConfig {
    key_id: String,
    key_secret: SecretString,
    api_base_url: String,
    timeout: Duration,
}

impl GatewayClientConfig {
    pub fn new(key_id: impl Into<String>, key_secret: SecretString) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for GatewayClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClientConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// HTTP client for the hosted checkout gateway.
pub struct RazorpayGateway {
    config: GatewayClientConfig,
    http_client: reqwest::Client,
}

impl RazorpayGateway {
    /// Builds the adapter with a timeout-bounded HTTP client.
    pub fn new(config: GatewayClientConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn read_error(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.description)
            .unwrap_or(body);
        GatewayError::from_status(status, message)
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(err.to_string())
    } else {
        GatewayError::Network(err.to_string())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Wire Types
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: String,
    notes: OrderNotes<'a>,
}

#[derive(Debug, Serialize)]
struct OrderNotes<'a> {
    user_id: &'a str,
    plan: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    created_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PaymentBody {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    #[serde(default)]
    order_id: Option<String>,
    /// An object when notes exist, an empty array when they do not.
    #[serde(default)]
    notes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    description: String,
}

impl PaymentBody {
    fn into_payment(self) -> Result<GatewayPayment, GatewayError> {
        let payment_id = PaymentId::new(self.id)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let order_id = self
            .order_id
            .filter(|id| !id.trim().is_empty())
            .map(OrderId::new)
            .transpose()
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let notes_user_id = self
            .notes
            .get("user_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(GatewayPayment {
            payment_id,
            order_id,
            status: GatewayStatus::parse(&self.status),
            amount_minor: self.amount,
            currency: self.currency,
            notes_user_id,
        })
    }
}

fn receipt_for(plan: PlanKind) -> String {
    // Receipts are limited to 40 characters.
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", plan.as_str(), &suffix[..20])
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        plan: PlanKind,
        user_id: &UserId,
    ) -> Result<PaymentOrder, GatewayError> {
        let body = CreateOrderBody {
            amount: amount_minor,
            currency,
            receipt: receipt_for(plan),
            notes: OrderNotes {
                user_id: user_id.as_str(),
                plan: plan.as_str(),
            },
        };

        let response = self
            .http_client
            .post(self.url("/v1/orders"))
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let err = Self::read_error(response).await;
            tracing::error!(error = %err, plan = %plan, "Gateway create_order failed");
            return Err(err);
        }

        let order: OrderBody = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let order_id =
            OrderId::new(order.id).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let created_at = order
            .created_at
            .and_then(Timestamp::from_unix_secs)
            .unwrap_or_else(Timestamp::now);

        Ok(PaymentOrder {
            order_id,
            amount_minor: order.amount,
            currency: order.currency,
            plan,
            user_id: user_id.clone(),
            created_at,
        })
    }

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<GatewayPayment, GatewayError> {
        let response = self
            .http_client
            .get(self.url(&format!("/v1/payments/{}", payment_id)))
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.expose_secret()))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let body: PaymentBody = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        body.into_payment()
    }

    fn key_id(&self) -> &str {
        &self.config.key_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment_json(notes: serde_json::Value) -> PaymentBody {
        serde_json::from_value(serde_json::json!({
            "id": "pay_29QQoUBi66xm2f",
            "entity": "payment",
            "amount": 14900,
            "currency": "INR",
            "status": "captured",
            "order_id": "order_9A33XWu170gUtm",
            "method": "upi",
            "notes": notes
        }))
        .unwrap()
    }

    #[test]
    fn parses_payment_with_user_note() {
        let payment = payment_json(serde_json::json!({ "user_id": "user-1" }))
            .into_payment()
            .unwrap();

        assert_eq!(payment.payment_id.as_str(), "pay_29QQoUBi66xm2f");
        assert_eq!(payment.order_id.unwrap().as_str(), "order_9A33XWu170gUtm");
        assert_eq!(payment.status, GatewayStatus::Captured);
        assert_eq!(payment.amount_minor, 14_900);
        assert_eq!(payment.notes_user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn empty_notes_array_means_no_user() {
        let payment = payment_json(serde_json::json!([])).into_payment().unwrap();
        assert!(payment.notes_user_id.is_none());
    }

    #[test]
    fn receipt_fits_gateway_limit() {
        assert!(receipt_for(PlanKind::Max).len() <= 40);
    }

    #[test]
    fn debug_output_redacts_secret() {
        let config = GatewayClientConfig::new("rzp_test_key", SecretString::new("hunter2".into()));
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("rzp_test_key"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = GatewayClientConfig::new("k", SecretString::new("s".into()))
            .with_base_url("http://localhost:9999/");
        let gateway = RazorpayGateway::new(config).unwrap();
        assert_eq!(gateway.url("/v1/orders"), "http://localhost:9999/v1/orders");
    }
}
