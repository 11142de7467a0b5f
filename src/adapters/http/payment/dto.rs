//! HTTP DTOs (Data Transfer Objects) for payment endpoints.
//!
//! These types define the JSON request/response structure for the payment API.
//! They serve as the boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{
    CreateOrderResult, EntitlementView, VerifyPaymentResult,
};
use crate::domain::billing::LedgerEntry;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to issue an order for a plan.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    /// "pro" or "max".
    #[serde(default)]
    pub plan: String,
}

/// What the checkout widget handed back to the client.
///
/// Fields default to empty so a missing field is reported as `bad_request`
/// by the verification handler rather than rejected by the extractor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub user_id: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

impl From<CreateOrderResult> for CreateOrderResponse {
    fn from(result: CreateOrderResult) -> Self {
        Self {
            order_id: result.order.order_id.to_string(),
            amount: result.order.amount_minor,
            currency: result.order.currency,
            key_id: result.key_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub plan: String,
    pub payment_id: String,
}

impl From<VerifyPaymentResult> for VerifyPaymentResponse {
    fn from(result: VerifyPaymentResult) -> Self {
        Self {
            success: true,
            plan: result.plan.as_str().to_string(),
            payment_id: result.payment_id.to_string(),
        }
    }
}

/// Current tier of the caller.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementResponse {
    /// Role as stored.
    pub role: String,
    /// Role to act on now; a lapsed pro reads as free.
    pub effective_role: String,
    pub subscription_type: String,
    /// RFC 3339, null for free and lifetime plans.
    pub subscription_end_date: Option<String>,
}

impl From<EntitlementView> for EntitlementResponse {
    fn from(view: EntitlementView) -> Self {
        Self {
            role: view.entitlement.role.as_str().to_string(),
            effective_role: view.effective_role.as_str().to_string(),
            subscription_type: view.entitlement.subscription_type.as_str().to_string(),
            subscription_end_date: view
                .entitlement
                .subscription_end_date
                .map(|end| end.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistoryItem {
    pub payment_id: String,
    pub order_id: String,
    pub plan: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub recorded_at: String,
}

impl From<LedgerEntry> for PaymentHistoryItem {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            payment_id: entry.payment_id.to_string(),
            order_id: entry.order_id.to_string(),
            plan: entry.plan.as_str().to_string(),
            amount: entry.amount_minor,
            currency: entry.currency,
            status: entry.status.to_string(),
            recorded_at: entry.recorded_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentHistoryResponse {
    pub payments: Vec<PaymentHistoryItem>,
}

impl From<Vec<LedgerEntry>> for PaymentHistoryResponse {
    fn from(entries: Vec<LedgerEntry>) -> Self {
        Self {
            payments: entries.into_iter().map(PaymentHistoryItem::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Standard error response. `message` is always generic.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. `invalid_signature`.
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
