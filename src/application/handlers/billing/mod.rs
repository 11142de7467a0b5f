//! Billing handlers.
//!
//! ## Commands
//! - Issuing a gateway order for a plan
//! - Verifying a completed checkout and crediting the entitlement
//!
//! ## Queries
//! - Get the caller's current entitlement
//! - List the caller's credited payments

mod create_order;
mod credit_entitlement;
mod get_entitlement;
mod list_payments;
mod verify_payment;

// Commands
pub use create_order::{CreateOrderCommand, CreateOrderHandler, CreateOrderResult};
pub use verify_payment::{
    VerifyPaymentCommand, VerifyPaymentConfig, VerifyPaymentHandler, VerifyPaymentResult,
};

// Queries
pub use get_entitlement::{EntitlementView, GetEntitlementHandler, GetEntitlementQuery};
pub use list_payments::{ListPaymentsHandler, ListPaymentsQuery};

// Shared
pub use credit_entitlement::{CreditConfig, CreditError, CreditOutcome, EntitlementCrediter};
