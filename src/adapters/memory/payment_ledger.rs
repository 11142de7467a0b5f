//! In-memory payment ledger.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::LedgerEntry;
use crate::domain::foundation::{DomainError, PaymentId, UserId};
use crate::ports::{AppendOutcome, PaymentLedger};

/// Append-only ledger kept in a vector. Payment ids are unique.
#[derive(Default)]
pub struct InMemoryPaymentLedger {
    entries: RwLock<Vec<LedgerEntry>>,
    failing: AtomicBool,
}

impl InMemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make appends fail until switched off.
    pub fn fail_appends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn has(&self, payment_id: &PaymentId) -> Result<bool, DomainError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .any(|e| &e.payment_id == payment_id))
    }

    async fn append(&self, entry: &LedgerEntry) -> Result<AppendOutcome, DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::database("simulated ledger write failure"));
        }
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.payment_id == entry.payment_id) {
            return Ok(AppendOutcome::AlreadyExists);
        }
        entries.push(entry.clone());
        Ok(AppendOutcome::Inserted)
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, DomainError> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(entries)
    }
}
