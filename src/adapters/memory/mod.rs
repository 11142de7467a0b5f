//! In-memory persistence adapters.
//!
//! Used by tests and by local runs without a database. Each store supports
//! failure injection so error paths can be exercised deterministically.

mod entitlement_store;
mod payment_claims;
mod payment_ledger;

pub use entitlement_store::InMemoryEntitlementStore;
pub use payment_claims::InMemoryPaymentClaimStore;
pub use payment_ledger::InMemoryPaymentLedger;
