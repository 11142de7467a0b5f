//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamp, errors, state machine)
//! - `billing` - Plans, signatures, entitlements and payment verification rules

pub mod billing;
pub mod foundation;
