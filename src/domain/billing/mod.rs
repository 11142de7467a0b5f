//! Billing domain module.
//!
//! Turns a gateway checkout into a durable entitlement change.
//!
//! # Module Structure
//!
//! - `signature` - HMAC checkout signature verification
//! - `plan` - Versioned plan catalog and amount-to-plan resolution
//! - `tier` - Role and subscription type enums
//! - `entitlement` - Entitlement rules (derived expiry, monotonic upgrades)
//! - `payment` - Orders, gateway payments, verified payments, ledger entries
//! - `claim` - Per-payment claim used for idempotent crediting
//! - `verification` - Verification attempt state machine
//! - `errors` - Verification and order errors with HTTP mapping

mod claim;
mod entitlement;
mod errors;
mod payment;
mod plan;
mod signature;
mod tier;
mod verification;

pub use claim::{ClaimOutcome, ClaimStatus, PaymentClaim};
pub use entitlement::{Entitlement, EntitlementChange, RenewalPolicy};
pub use errors::{OrderError, VerificationError};
pub use payment::{
    GatewayPayment, GatewayStatus, LedgerEntry, PaymentOrder, UnsuccessfulPayment,
    VerifiedPayment,
};
pub use plan::{resolve_plan, Plan, PlanCatalog, PlanDuration, PlanKind, MAX_LIFETIME, PRO_MONTHLY};
pub use signature::{compute_signature, verify as verify_signature, SignatureVerifier};
pub use tier::{Role, SubscriptionType};
pub use verification::{AbortReason, VerificationAttempt, VerificationState};
