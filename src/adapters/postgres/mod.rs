//! PostgreSQL adapters - Database implementations for persistence ports.
//!
//! - `PostgresEntitlementStore` - Entitlement columns on `profiles`
//! - `PostgresPaymentLedger` - Append-only `payment_ledger`
//! - `PostgresPaymentClaimStore` - Idempotency claims in `payment_claims`

mod entitlement_store;
mod payment_claims;
mod payment_ledger;

pub use entitlement_store::PostgresEntitlementStore;
pub use payment_claims::PostgresPaymentClaimStore;
pub use payment_ledger::PostgresPaymentLedger;
