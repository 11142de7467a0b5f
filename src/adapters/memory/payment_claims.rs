//! In-memory payment claim store.
//!
//! A single write lock around the map gives the same first-insert-wins
//! guarantee as the primary key does in Postgres.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{ClaimOutcome, ClaimStatus, PaymentClaim};
use crate::domain::foundation::{DomainError, ErrorCode, PaymentId, StateMachine, Timestamp};
use crate::ports::PaymentClaimStore;

/// Claim store backed by a hash map, with failure injection for claiming
/// and for status marks.
#[derive(Default)]
pub struct InMemoryPaymentClaimStore {
    claims: RwLock<HashMap<PaymentId, PaymentClaim>>,
    failing_claims: AtomicU32,
    failing_marks: Mutex<HashMap<ClaimStatus, u32>>,
}

fn consume(remaining: &mut u32) -> bool {
    match *remaining {
        0 => false,
        u32::MAX => true,
        n => {
            *remaining = n - 1;
            true
        }
    }
}

impl InMemoryPaymentClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<PaymentClaim> {
        self.claims.read().await.values().cloned().collect()
    }

    /// Insert a claim as-is, bypassing the claim protocol.
    pub async fn seed(&self, claim: PaymentClaim) {
        self.claims
            .write()
            .await
            .insert(claim.payment_id.clone(), claim);
    }

    /// Make the next `count` `try_claim` calls fail. `u32::MAX` fails them all.
    pub fn fail_next_claims(&self, count: u32) {
        self.failing_claims.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` marks to `target` fail. `u32::MAX` fails them all.
    pub fn fail_next_marks(&self, target: ClaimStatus, count: u32) {
        self.failing_marks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(target, count);
    }

    fn take_claim_failure(&self) -> bool {
        let mut remaining = self.failing_claims.load(Ordering::SeqCst);
        let failed = consume(&mut remaining);
        self.failing_claims.store(remaining, Ordering::SeqCst);
        failed
    }

    fn take_mark_failure(&self, target: ClaimStatus) -> Result<(), DomainError> {
        let mut marks = self.failing_marks.lock().unwrap_or_else(|e| e.into_inner());
        match marks.get_mut(&target).map(|remaining| consume(remaining)) {
            Some(true) => Err(DomainError::database(format!(
                "simulated failure marking claim {}",
                target
            ))),
            _ => Ok(()),
        }
    }

    async fn transition(
        &self,
        payment_id: &PaymentId,
        target: ClaimStatus,
        error: Option<&str>,
    ) -> Result<(), DomainError> {
        let mut claims = self.claims.write().await;
        let claim = claims.get_mut(payment_id).ok_or_else(|| {
            DomainError::new(ErrorCode::NotFound, format!("no claim for {}", payment_id))
        })?;

        if claim.status != target {
            claim.status = claim.status.transition_to(target).map_err(|e| {
                DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
            })?;
        }
        claim.updated_at = Timestamp::now();
        if let Some(error) = error {
            claim.attempts += 1;
            claim.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentClaimStore for InMemoryPaymentClaimStore {
    async fn try_claim(
        &self,
        claim: &PaymentClaim,
        stale_before: Timestamp,
    ) -> Result<ClaimOutcome, DomainError> {
        if self.take_claim_failure() {
            return Err(DomainError::database("simulated claim store outage"));
        }
        let mut claims = self.claims.write().await;
        let existing = claims
            .get(&claim.payment_id)
            .map(|c| (c.status, c.is_stale(stale_before), c.attempts));

        match existing {
            None => {
                claims.insert(claim.payment_id.clone(), claim.clone());
                Ok(ClaimOutcome::Acquired)
            }
            Some((_, true, attempts)) => {
                let mut replacement = claim.clone();
                replacement.attempts = attempts + 1;
                claims.insert(claim.payment_id.clone(), replacement);
                Ok(ClaimOutcome::TakenOver)
            }
            Some((status, false, _)) => Ok(ClaimOutcome::Held(status)),
        }
    }

    async fn find(&self, payment_id: &PaymentId) -> Result<Option<PaymentClaim>, DomainError> {
        Ok(self.claims.read().await.get(payment_id).cloned())
    }

    async fn mark_credited(&self, payment_id: &PaymentId) -> Result<(), DomainError> {
        self.take_mark_failure(ClaimStatus::Credited)?;
        self.transition(payment_id, ClaimStatus::Credited, None).await
    }

    async fn mark_credit_pending(
        &self,
        payment_id: &PaymentId,
        error: &str,
    ) -> Result<(), DomainError> {
        self.take_mark_failure(ClaimStatus::CreditPending)?;
        self.transition(payment_id, ClaimStatus::CreditPending, Some(error))
            .await
    }

    async fn mark_recorded(&self, payment_id: &PaymentId) -> Result<(), DomainError> {
        self.take_mark_failure(ClaimStatus::Recorded)?;
        self.transition(payment_id, ClaimStatus::Recorded, None).await
    }

    async fn release(&self, payment_id: &PaymentId) -> Result<(), DomainError> {
        let mut claims = self.claims.write().await;
        if matches!(claims.get(payment_id), Some(c) if c.status == ClaimStatus::InFlight) {
            claims.remove(payment_id);
        }
        Ok(())
    }

    async fn find_unsettled(
        &self,
        limit: usize,
        stale_before: Timestamp,
    ) -> Result<Vec<PaymentClaim>, DomainError> {
        let mut unsettled: Vec<_> = self
            .claims
            .read()
            .await
            .values()
            .filter(|c| c.is_unsettled(stale_before))
            .cloned()
            .collect();
        unsettled.sort_by(|a, b| a.claimed_at.cmp(&b.claimed_at));
        unsettled.truncate(limit);
        Ok(unsettled)
    }

    async fn record_failure(
        &self,
        payment_id: &PaymentId,
        status: ClaimStatus,
        error: &str,
    ) -> Result<(), DomainError> {
        self.transition(payment_id, status, Some(error)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{GatewayStatus, LedgerEntry, PlanKind, SubscriptionType};
    use crate::domain::foundation::{OrderId, UserId};

    fn claim(now: Timestamp) -> PaymentClaim {
        PaymentClaim::in_flight(
            LedgerEntry {
                payment_id: PaymentId::new("pay_1").unwrap(),
                order_id: OrderId::new("order_1").unwrap(),
                user_id: UserId::new("user-1").unwrap(),
                amount_minor: 14_900,
                currency: "INR".into(),
                status: GatewayStatus::Captured,
                plan: PlanKind::Pro,
                subscription_type: SubscriptionType::ProMonthly,
                recorded_at: now,
            },
            now,
        )
    }

    #[tokio::test]
    async fn first_claim_wins() {
        let store = InMemoryPaymentClaimStore::new();
        let now = Timestamp::now();
        let cutoff = now.plus_secs(-60);

        assert_eq!(store.try_claim(&claim(now), cutoff).await.unwrap(), ClaimOutcome::Acquired);
        assert_eq!(
            store.try_claim(&claim(now), cutoff).await.unwrap(),
            ClaimOutcome::Held(ClaimStatus::InFlight)
        );
    }

    #[tokio::test]
    async fn stale_in_flight_claim_is_taken_over() {
        let store = InMemoryPaymentClaimStore::new();
        let now = Timestamp::now();
        store.seed(claim(now.plus_secs(-600))).await;

        let outcome = store.try_claim(&claim(now), now.plus_secs(-60)).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::TakenOver);
    }

    #[tokio::test]
    async fn credited_claim_is_never_taken_over() {
        let store = InMemoryPaymentClaimStore::new();
        let now = Timestamp::now();
        let mut old = claim(now.plus_secs(-600));
        old.status = ClaimStatus::Credited;
        store.seed(old).await;

        let outcome = store.try_claim(&claim(now), now.plus_secs(-60)).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Held(ClaimStatus::Credited));
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = InMemoryPaymentClaimStore::new();
        let now = Timestamp::now();
        store.seed(claim(now)).await;
        let payment_id = PaymentId::new("pay_1").unwrap();

        let err = store.mark_recorded(&payment_id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
    }

    #[tokio::test]
    async fn release_only_drops_in_flight_claims() {
        let store = InMemoryPaymentClaimStore::new();
        let now = Timestamp::now();
        store.seed(claim(now)).await;
        let payment_id = PaymentId::new("pay_1").unwrap();

        store.mark_credited(&payment_id).await.unwrap();
        store.release(&payment_id).await.unwrap();
        assert!(store.find(&payment_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unsettled_lists_pending_and_credited() {
        let store = InMemoryPaymentClaimStore::new();
        let now = Timestamp::now();
        let cutoff = now.plus_secs(-60);
        store.seed(claim(now)).await;
        let payment_id = PaymentId::new("pay_1").unwrap();
        assert!(store.find_unsettled(10, cutoff).await.unwrap().is_empty());

        store.mark_credit_pending(&payment_id, "db down").await.unwrap();
        let unsettled = store.find_unsettled(10, cutoff).await.unwrap();
        assert_eq!(unsettled.len(), 1);
        assert_eq!(unsettled[0].attempts, 1);
        assert_eq!(unsettled[0].last_error.as_deref(), Some("db down"));
    }

    #[tokio::test]
    async fn unsettled_includes_abandoned_in_flight_claims() {
        let store = InMemoryPaymentClaimStore::new();
        let now = Timestamp::now();
        store.seed(claim(now.plus_secs(-600))).await;

        let unsettled = store.find_unsettled(10, now.plus_secs(-60)).await.unwrap();

        assert_eq!(unsettled.len(), 1);
        assert_eq!(unsettled[0].status, ClaimStatus::InFlight);
    }

    #[tokio::test]
    async fn injected_mark_failures_run_out() {
        let store = InMemoryPaymentClaimStore::new();
        store.seed(claim(Timestamp::now())).await;
        let payment_id = PaymentId::new("pay_1").unwrap();
        store.fail_next_marks(ClaimStatus::Credited, 1);

        assert!(store.mark_credited(&payment_id).await.is_err());
        assert_eq!(
            store.find(&payment_id).await.unwrap().unwrap().status,
            ClaimStatus::InFlight
        );
        store.mark_credited(&payment_id).await.unwrap();
        store.mark_recorded(&payment_id).await.unwrap();
    }

    #[tokio::test]
    async fn failing_claim_store_takes_no_claim() {
        let store = InMemoryPaymentClaimStore::new();
        let now = Timestamp::now();
        store.fail_next_claims(1);

        assert!(store.try_claim(&claim(now), now.plus_secs(-60)).await.is_err());
        assert!(store.all().await.is_empty());
        assert_eq!(
            store.try_claim(&claim(now), now.plus_secs(-60)).await.unwrap(),
            ClaimOutcome::Acquired
        );
    }
}
