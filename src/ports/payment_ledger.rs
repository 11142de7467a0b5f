//! Payment ledger port - append-only record of credited payments.
//!
//! ## Race Condition Handling
//!
//! Implementations must rely on a unique constraint on `payment_id`:
//! - First append wins
//! - Others get `AlreadyExists` and must treat it as success

use async_trait::async_trait;

use crate::domain::billing::LedgerEntry;
use crate::domain::foundation::{DomainError, PaymentId, UserId};

/// Result of appending a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Entry was inserted (first time seeing this payment).
    Inserted,
    /// An entry for this payment id already exists.
    AlreadyExists,
}

/// Port for the payment ledger.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Whether an entry for `payment_id` exists.
    async fn has(&self, payment_id: &PaymentId) -> Result<bool, DomainError>;

    /// Append `entry`, detecting an existing entry for the same payment id.
    ///
    /// Uses `ON CONFLICT DO NOTHING` semantics.
    async fn append(&self, entry: &LedgerEntry) -> Result<AppendOutcome, DomainError>;

    /// Ledger entries for one user, newest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, DomainError>;
}
