//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).
//! The credit reconciler runs beside them as a background worker.

pub mod handlers;
pub mod reconciler;

pub use reconciler::{CreditReconciler, ReconcileReport, ReconcilerConfig};
