//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod billing;

pub use billing::{
    CreateOrderCommand, CreateOrderHandler, CreateOrderResult, CreditConfig, EntitlementCrediter,
    EntitlementView, GetEntitlementHandler, GetEntitlementQuery, ListPaymentsHandler,
    ListPaymentsQuery, VerifyPaymentCommand,
    VerifyPaymentConfig, VerifyPaymentHandler, VerifyPaymentResult,
};
