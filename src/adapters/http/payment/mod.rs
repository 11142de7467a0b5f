//! HTTP adapter for payment endpoints.
//!
//! Exposes the billing application layer via REST API:
//! - `POST /payment/create` - Issue a gateway order for a plan
//! - `POST /payment/verify` - Verify a completed checkout
//! - `GET /payment/entitlement` - Current tier of the caller
//! - `GET /payment/history` - Payments credited to the caller
//! - `GET /health` - Liveness check

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AuthenticatedUser, PaymentApiError, PaymentAppState};
pub use routes::{payment_router, payment_routes};
