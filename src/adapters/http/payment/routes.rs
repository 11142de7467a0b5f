//! Axum router configuration for payment endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    create_order, get_entitlement, health, list_payments, verify_payment, PaymentAppState,
};

/// Routes mounted under `/payment`.
///
/// # Routes
/// - `POST /create` - Issue an order (requires `X-User-Id`)
/// - `POST /verify` - Verify a checkout and credit the plan
/// - `GET /entitlement` - Current tier (requires `X-User-Id`)
/// - `GET /history` - Credited payments (requires `X-User-Id`)
pub fn payment_routes() -> Router<PaymentAppState> {
    Router::new()
        .route("/create", post(create_order))
        .route("/verify", post(verify_payment))
        .route("/entitlement", get(get_entitlement))
        .route("/history", get(list_payments))
}

/// Complete service router: payment routes plus `GET /health`.
///
/// ```ignore
/// let app = payment_router().with_state(state);
/// ```
pub fn payment_router() -> Router<PaymentAppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/payment", payment_routes())
}
