//! Invoice Billing - payment verification and entitlement service
//!
//! This crate issues gateway orders, verifies completed checkouts and
//! idempotently upgrades the buyer's plan, keeping an append-only ledger of
//! every credited payment.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
