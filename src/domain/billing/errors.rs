//! Billing error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | Code | HTTP Status | Retryable |
//! |-------|------|-------------|-----------|
//! | BadRequest | bad_request | 400 | no |
//! | InvalidSignature | invalid_signature | 401 | no |
//! | PaymentNotSuccessful | payment_not_successful | 402 | no |
//! | OrderMismatch | order_mismatch | 400 | no |
//! | UserMismatch | user_mismatch | 403 | no |
//! | UnknownPlanAmount | unknown_plan_amount | 422 | no |
//! | GatewayUnreachable | gateway_unreachable | 503 | yes |
//! | VerificationInProgress | verification_in_progress | 409 | yes |
//! | StorageUnavailable | storage_unavailable | 503 | yes |
//! | EntitlementWriteFailed | entitlement_write_failed | 500 | no |
//!
//! `StorageUnavailable` means nothing was written for the payment, so the
//! client must resubmit. `EntitlementWriteFailed` means a pending credit is
//! on record and the reconciler will finish it.
//!
//! The `Display` text carries internal detail for logs. Clients only ever see
//! [`VerificationError::public_message`].

use axum::http::StatusCode;
use thiserror::Error;

use super::payment::GatewayStatus;
use super::plan::PlanKind;
use super::verification::AbortReason;
use crate::domain::foundation::{DomainError, ValidationError};

/// Errors that stop a payment verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Required request field missing or blank.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Signature did not match the order/payment pair.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Gateway reports a status other than captured or authorized.
    #[error("Payment not successful: status '{0}'")]
    PaymentNotSuccessful(GatewayStatus),

    /// Gateway says the payment belongs to a different order.
    #[error("Order mismatch: request '{requested}', gateway '{actual}'")]
    OrderMismatch { requested: String, actual: String },

    /// Order notes name a different owner than the caller.
    #[error("User mismatch for payment")]
    UserMismatch,

    /// Charged amount is not a catalog price.
    #[error("Unknown plan amount: {amount} {currency}")]
    UnknownPlanAmount { amount: i64, currency: String },

    /// Gateway timed out, refused, or answered 5xx.
    #[error("Gateway unreachable: {0}")]
    GatewayUnreachable(String),

    /// Another verifier currently holds the claim for this payment.
    #[error("Verification already in progress")]
    VerificationInProgress,

    /// Claim or entitlement storage failed before anything was written.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The entitlement could not be persisted; the credit is pending.
    #[error("Entitlement write failed: {0}")]
    EntitlementWriteFailed(String),
}

impl VerificationError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        VerificationError::BadRequest(message.into())
    }

    pub fn gateway_unreachable(message: impl Into<String>) -> Self {
        VerificationError::GatewayUnreachable(message.into())
    }

    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        VerificationError::StorageUnavailable(message.into())
    }

    pub fn entitlement_write_failed(message: impl Into<String>) -> Self {
        VerificationError::EntitlementWriteFailed(message.into())
    }

    /// Abort reason recorded on the verification attempt.
    pub fn reason(&self) -> AbortReason {
        match self {
            VerificationError::BadRequest(_) => AbortReason::BadRequest,
            VerificationError::InvalidSignature => AbortReason::InvalidSignature,
            VerificationError::PaymentNotSuccessful(_) => AbortReason::PaymentNotSuccessful,
            VerificationError::OrderMismatch { .. } => AbortReason::OrderMismatch,
            VerificationError::UserMismatch => AbortReason::UserMismatch,
            VerificationError::UnknownPlanAmount { .. } => AbortReason::UnknownPlanAmount,
            VerificationError::GatewayUnreachable(_) => AbortReason::GatewayUnreachable,
            VerificationError::VerificationInProgress => AbortReason::VerificationInProgress,
            VerificationError::StorageUnavailable(_) => AbortReason::StorageUnavailable,
            VerificationError::EntitlementWriteFailed(_) => AbortReason::EntitlementWriteFailed,
        }
    }

    /// Wire code for the `error` field of the response body.
    pub fn code(&self) -> &'static str {
        self.reason().as_str()
    }

    /// Returns true if the client may resubmit the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerificationError::GatewayUnreachable(_)
                | VerificationError::VerificationInProgress
                | VerificationError::StorageUnavailable(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::BadRequest(_) | VerificationError::OrderMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            VerificationError::InvalidSignature => StatusCode::UNAUTHORIZED,
            VerificationError::PaymentNotSuccessful(_) => StatusCode::PAYMENT_REQUIRED,
            VerificationError::UserMismatch => StatusCode::FORBIDDEN,
            VerificationError::UnknownPlanAmount { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VerificationError::GatewayUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            VerificationError::VerificationInProgress => StatusCode::CONFLICT,
            VerificationError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            VerificationError::EntitlementWriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Generic text safe to return to the client.
    pub fn public_message(&self) -> &'static str {
        match self {
            VerificationError::BadRequest(_) => "Missing or invalid payment details",
            VerificationError::InvalidSignature => "Payment verification failed",
            VerificationError::PaymentNotSuccessful(_) => "Payment was not completed",
            VerificationError::OrderMismatch { .. } => "Payment does not belong to this order",
            VerificationError::UserMismatch => "Payment does not belong to this account",
            VerificationError::UnknownPlanAmount { .. } => {
                "Payment amount does not match any plan; support has been notified"
            }
            VerificationError::GatewayUnreachable(_) => {
                "Payment provider is unavailable, please retry shortly"
            }
            VerificationError::VerificationInProgress => {
                "This payment is already being processed, please retry shortly"
            }
            VerificationError::StorageUnavailable(_) => {
                "Payment service is temporarily unavailable, please retry shortly"
            }
            VerificationError::EntitlementWriteFailed(_) => {
                "Payment received but your plan could not be updated yet; it will be applied automatically"
            }
        }
    }
}

impl From<ValidationError> for VerificationError {
    fn from(err: ValidationError) -> Self {
        VerificationError::BadRequest(err.to_string())
    }
}

/// Errors from issuing a new order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Requested plan name is not one we sell.
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    /// Plan exists but the current catalog carries no price for it.
    #[error("Plan not offered: {0}")]
    PlanNotOffered(PlanKind),

    /// Gateway refused or could not be reached.
    #[error("Gateway unreachable: {0}")]
    GatewayUnreachable(String),
}

impl OrderError {
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::UnknownPlan(_) | OrderError::PlanNotOffered(_) => "bad_request",
            OrderError::GatewayUnreachable(_) => "gateway_unreachable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OrderError::UnknownPlan(_) | OrderError::PlanNotOffered(_) => StatusCode::BAD_REQUEST,
            OrderError::GatewayUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            OrderError::UnknownPlan(_) | OrderError::PlanNotOffered(_) => {
                "Requested plan is not available"
            }
            OrderError::GatewayUnreachable(_) => {
                "Payment provider is unavailable, please retry shortly"
            }
        }
    }
}

/// Storage failures that reach the caller before any write are retryable.
impl From<DomainError> for VerificationError {
    fn from(err: DomainError) -> Self {
        VerificationError::StorageUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_errors() -> Vec<VerificationError> {
        vec![
            VerificationError::bad_request("order_id"),
            VerificationError::InvalidSignature,
            VerificationError::PaymentNotSuccessful(GatewayStatus::Failed),
            VerificationError::OrderMismatch {
                requested: "order_a".into(),
                actual: "order_b".into(),
            },
            VerificationError::UserMismatch,
            VerificationError::UnknownPlanAmount {
                amount: 1,
                currency: "INR".into(),
            },
            VerificationError::gateway_unreachable("timeout"),
            VerificationError::VerificationInProgress,
            VerificationError::storage_unavailable("pool timed out"),
            VerificationError::entitlement_write_failed("connection reset"),
        ]
    }

    // ══════════════════════════════════════════════════════════════
    // Status Code Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn status_codes_match_error_table() {
        let expected = [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::PAYMENT_REQUIRED,
            StatusCode::BAD_REQUEST,
            StatusCode::FORBIDDEN,
            StatusCode::UNPROCESSABLE_ENTITY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::CONFLICT,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::INTERNAL_SERVER_ERROR,
        ];
        for (err, status) in all_errors().iter().zip(expected) {
            assert_eq!(err.status_code(), status, "{:?}", err);
        }
    }

    #[test]
    fn only_failures_with_nothing_written_are_retryable() {
        let retryable: Vec<_> = all_errors()
            .into_iter()
            .filter(|e| e.is_retryable())
            .map(|e| e.code())
            .collect();
        assert_eq!(
            retryable,
            vec!["gateway_unreachable", "verification_in_progress", "storage_unavailable"]
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Message Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn public_messages_never_contain_internal_detail() {
        for err in all_errors() {
            let message = err.public_message();
            assert!(!message.contains("timeout"));
            assert!(!message.contains("connection reset"));
            assert!(!message.contains("pool"));
            assert!(!message.contains("order_b"));
        }
    }

    #[test]
    fn display_keeps_detail_for_logs() {
        let err = VerificationError::gateway_unreachable("connect timeout after 10s");
        assert_eq!(
            err.to_string(),
            "Gateway unreachable: connect timeout after 10s"
        );
    }

    #[test]
    fn validation_error_becomes_bad_request() {
        let err: VerificationError = ValidationError::empty_field("signature").into();
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn storage_failure_before_any_write_asks_for_retry() {
        let err: VerificationError = DomainError::database("claim insert failed").into();
        assert_eq!(err.code(), "storage_unavailable");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.is_retryable());
        assert!(!err.public_message().contains("automatically"));
    }

    #[test]
    fn order_errors_map_to_codes() {
        assert_eq!(OrderError::UnknownPlan("gold".into()).code(), "bad_request");
        assert_eq!(
            OrderError::GatewayUnreachable("503".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
