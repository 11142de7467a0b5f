//! HTTP handlers for payment endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::handlers::billing::{
    CreateOrderCommand, CreateOrderHandler, EntitlementCrediter, GetEntitlementHandler,
    GetEntitlementQuery, ListPaymentsHandler, ListPaymentsQuery, VerifyPaymentCommand,
    VerifyPaymentConfig, VerifyPaymentHandler,
};
use crate::domain::billing::{OrderError, PlanCatalog, SignatureVerifier, VerificationError};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{EntitlementStore, PaymentClaimStore, PaymentGateway, PaymentLedger};

use super::dto::{
    CreateOrderRequest, CreateOrderResponse, EntitlementResponse, ErrorResponse, HealthResponse,
    PaymentHistoryResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// This struct is cloned for each request and contains Arc-wrapped dependencies
/// for efficient sharing across handlers.
#[derive(Clone)]
pub struct PaymentAppState {
    pub gateway: Arc<dyn PaymentGateway>,
    pub entitlement_store: Arc<dyn EntitlementStore>,
    pub ledger: Arc<dyn PaymentLedger>,
    pub claims: Arc<dyn PaymentClaimStore>,
    pub crediter: Arc<EntitlementCrediter>,
    pub verifier: SignatureVerifier,
    pub catalog: PlanCatalog,
    pub verify_config: VerifyPaymentConfig,
}

impl PaymentAppState {
    /// Create handlers on demand from the shared state.
    pub fn create_order_handler(&self) -> CreateOrderHandler {
        CreateOrderHandler::new(self.gateway.clone(), self.catalog)
    }

    pub fn verify_payment_handler(&self) -> VerifyPaymentHandler {
        VerifyPaymentHandler::new(
            self.verifier.clone(),
            self.gateway.clone(),
            self.crediter.clone(),
            self.ledger.clone(),
            self.claims.clone(),
            self.catalog,
            self.verify_config.clone(),
        )
    }

    pub fn get_entitlement_handler(&self) -> GetEntitlementHandler {
        GetEntitlementHandler::new(self.entitlement_store.clone())
    }

    pub fn list_payments_handler(&self) -> ListPaymentsHandler {
        ListPaymentsHandler::new(self.ledger.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity set by the upstream auth layer.
///
/// Authentication happens before this service; the gateway in front of it
/// forwards the authenticated user in `X-User-Id`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("authentication_required", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user_id = parts
                .headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| UserId::new(s).ok())
                .ok_or(AuthenticationRequired)?;

            Ok(AuthenticatedUser { user_id })
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// POST /payment/create - Issue a gateway order for a plan
pub async fn create_order(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let Json(request) = payload.map_err(PaymentApiError::malformed_body)?;

    let handler = state.create_order_handler();
    let cmd = CreateOrderCommand {
        user_id: user.user_id,
        plan: request.plan,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(CreateOrderResponse::from(result)))
}

/// POST /payment/verify - Verify a completed checkout and credit the plan
///
/// The owner comes from the body. When the auth layer also forwarded a
/// caller, the two must agree.
pub async fn verify_payment(
    State(state): State<PaymentAppState>,
    caller: Option<AuthenticatedUser>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let Json(request) = payload.map_err(PaymentApiError::malformed_body)?;

    if let Some(caller) = caller {
        if !request.user_id.trim().is_empty() && caller.user_id.as_str() != request.user_id.trim() {
            tracing::warn!(
                security_event = "payment_user_mismatch",
                caller = %caller.user_id,
                "Verify body names a different user than the caller"
            );
            return Err(VerificationError::UserMismatch.into());
        }
    }

    let handler = state.verify_payment_handler();
    let cmd = VerifyPaymentCommand {
        order_id: request.order_id,
        payment_id: request.payment_id,
        signature: request.signature,
        user_id: request.user_id,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(VerifyPaymentResponse::from(result)))
}

/// GET /payment/entitlement - Current tier of the caller
pub async fn get_entitlement(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, PaymentApiError> {
    let handler = state.get_entitlement_handler();
    let query = GetEntitlementQuery {
        user_id: user.user_id,
    };

    let view = handler.handle(query).await?;

    Ok(Json(EntitlementResponse::from(view)))
}

/// GET /payment/history - Payments credited to the caller, newest first
pub async fn list_payments(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, PaymentApiError> {
    let handler = state.list_payments_handler();
    let query = ListPaymentsQuery {
        user_id: user.user_id,
    };

    let entries = handler.handle(query).await?;

    Ok(Json(PaymentHistoryResponse::from(entries)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error wrapper mapping application errors onto HTTP responses.
///
/// Only generic messages leave the service; detail goes to the logs.
#[derive(Debug)]
pub enum PaymentApiError {
    Verification(VerificationError),
    Order(OrderError),
    Storage(DomainError),
}

impl PaymentApiError {
    fn malformed_body(rejection: JsonRejection) -> Self {
        PaymentApiError::Verification(VerificationError::bad_request(rejection.body_text()))
    }
}

impl From<VerificationError> for PaymentApiError {
    fn from(err: VerificationError) -> Self {
        Self::Verification(err)
    }
}

impl From<OrderError> for PaymentApiError {
    fn from(err: OrderError) -> Self {
        Self::Order(err)
    }
}

impl From<DomainError> for PaymentApiError {
    fn from(err: DomainError) -> Self {
        Self::Storage(err)
    }
}

impl IntoResponse for PaymentApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            PaymentApiError::Verification(err) => {
                if err.status_code().is_server_error() {
                    tracing::error!(code = err.code(), error = %err, "Payment verification failed");
                } else {
                    tracing::info!(code = err.code(), error = %err, "Payment verification rejected");
                }
                (
                    err.status_code(),
                    ErrorResponse::new(err.code(), err.public_message()),
                )
            }
            PaymentApiError::Order(err) => {
                tracing::info!(code = err.code(), error = %err, "Order rejected");
                (
                    err.status_code(),
                    ErrorResponse::new(err.code(), err.public_message()),
                )
            }
            PaymentApiError::Storage(err) => {
                tracing::error!(error = %err, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("internal_error", "Something went wrong, please retry"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn verification_error_maps_to_code_and_generic_message() {
        let err = PaymentApiError::from(VerificationError::gateway_unreachable(
            "connect to 10.0.0.7:443 refused",
        ));

        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"], "gateway_unreachable");
        assert!(!json["message"].as_str().unwrap().contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn storage_outage_during_verification_is_service_unavailable() {
        let response =
            PaymentApiError::from(VerificationError::storage_unavailable("pool timed out"))
                .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"], "storage_unavailable");
        assert!(!json["message"].as_str().unwrap().contains("pool"));
    }

    #[tokio::test]
    async fn order_error_maps_to_bad_request() {
        let response = PaymentApiError::from(OrderError::UnknownPlan("gold".into())).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "bad_request");
    }

    #[tokio::test]
    async fn storage_error_hides_detail() {
        let response =
            PaymentApiError::from(DomainError::database("relation profiles does not exist"))
                .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "internal_error");
        assert!(!json["message"].as_str().unwrap().contains("profiles"));
    }

    #[tokio::test]
    async fn missing_user_header_is_unauthorized() {
        let response = AuthenticationRequired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "authentication_required");
    }
}
