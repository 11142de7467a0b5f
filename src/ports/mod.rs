//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Gateway Ports
//!
//! - `PaymentGateway` - Order issuance and payment lookup
//!
//! ## Persistence Ports
//!
//! - `EntitlementStore` - Entitlement fields on the user profile
//! - `PaymentLedger` - Append-only record of credited payments
//! - `PaymentClaimStore` - Per-payment claim for idempotent crediting

mod entitlement_store;
mod payment_claims;
mod payment_gateway;
mod payment_ledger;

pub use entitlement_store::EntitlementStore;
pub use payment_claims::PaymentClaimStore;
pub use payment_gateway::{GatewayError, PaymentGateway};
pub use payment_ledger::{AppendOutcome, PaymentLedger};
