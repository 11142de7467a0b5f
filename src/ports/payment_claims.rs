//! Payment claim store port.
//!
//! The claim table is the durable mutex that makes crediting idempotent. A
//! row keyed by payment id is inserted before the entitlement is touched;
//! whoever inserts it owns the credit.
//!
//! Implementations should use the PRIMARY KEY on `payment_id` so that two
//! concurrent `try_claim` calls can never both return an owned outcome.

use async_trait::async_trait;

use crate::domain::billing::{ClaimOutcome, ClaimStatus, PaymentClaim};
use crate::domain::foundation::{DomainError, PaymentId, Timestamp};

/// Port for payment claims.
#[async_trait]
pub trait PaymentClaimStore: Send + Sync {
    /// Insert `claim`, or report who holds it.
    ///
    /// An existing `in_flight` claim last touched before `stale_before` is
    /// replaced and reported as `TakenOver`.
    async fn try_claim(
        &self,
        claim: &PaymentClaim,
        stale_before: Timestamp,
    ) -> Result<ClaimOutcome, DomainError>;

    /// Look up the claim for `payment_id`.
    async fn find(&self, payment_id: &PaymentId) -> Result<Option<PaymentClaim>, DomainError>;

    /// Entitlement persisted; ledger entry still owed.
    async fn mark_credited(&self, payment_id: &PaymentId) -> Result<(), DomainError>;

    /// Entitlement write gave up; record the error and bump the attempt count.
    async fn mark_credit_pending(
        &self,
        payment_id: &PaymentId,
        error: &str,
    ) -> Result<(), DomainError>;

    /// Ledger entry stored; nothing left to do.
    async fn mark_recorded(&self, payment_id: &PaymentId) -> Result<(), DomainError>;

    /// Drop an in-flight claim whose verification aborted before crediting.
    async fn release(&self, payment_id: &PaymentId) -> Result<(), DomainError>;

    /// Claims in `credit_pending` or `credited`, plus `in_flight` claims
    /// last touched before `stale_before`, oldest first.
    async fn find_unsettled(
        &self,
        limit: usize,
        stale_before: Timestamp,
    ) -> Result<Vec<PaymentClaim>, DomainError>;

    /// Record a failed reconciliation attempt without changing status.
    async fn record_failure(
        &self,
        payment_id: &PaymentId,
        status: ClaimStatus,
        error: &str,
    ) -> Result<(), DomainError>;
}
