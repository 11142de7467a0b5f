//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `gateway` - Payment gateway REST client and in-memory fake
//! - `http` - Axum REST API
//! - `memory` - In-memory stores for tests and local runs
//! - `postgres` - PostgreSQL stores

pub mod gateway;
pub mod http;
pub mod memory;
pub mod postgres;

pub use gateway::{GatewayClientConfig, InMemoryGateway, RazorpayGateway};
pub use memory::{InMemoryEntitlementStore, InMemoryPaymentClaimStore, InMemoryPaymentLedger};
pub use postgres::{PostgresEntitlementStore, PostgresPaymentClaimStore, PostgresPaymentLedger};
