//! EntitlementCrediter - applies a purchased plan to a user's entitlement.
//!
//! Shared by the verify handler and the credit reconciler. Each attempt
//! re-reads the entitlement so a retry never writes a stale value, and every
//! write is tagged with the crediting payment so the same payment is never
//! applied twice.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::domain::billing::{Entitlement, EntitlementChange, Plan, RenewalPolicy};
use crate::domain::foundation::{DomainError, PaymentId, Timestamp, UserId};
use crate::ports::EntitlementStore;

/// Retry settings for entitlement writes.
#[derive(Debug, Clone)]
pub struct CreditConfig {
    pub renewal_policy: RenewalPolicy,
    /// Total tries, including the first one.
    pub max_attempts: u32,
    /// Delay before the second try; doubled on each further try.
    pub initial_backoff: Duration,
    /// Upper bound on a single entitlement read or write.
    pub store_timeout: Duration,
}

impl CreditConfig {
    /// Longest a single `credit` call can take.
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let backoff = (0..attempts - 1).fold(Duration::ZERO, |total, i| {
            total + self.initial_backoff.saturating_mul(1u32 << i.min(16))
        });
        self.store_timeout.saturating_mul(attempts.saturating_mul(2)) + backoff
    }
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            renewal_policy: RenewalPolicy::default(),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// What crediting did to the entitlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// The entitlement was written with this new value.
    Upgraded(Entitlement),
    /// The user already had at least what the plan grants.
    Unchanged(Entitlement),
    /// An earlier run already wrote this payment's credit.
    AlreadyApplied(Entitlement),
}

impl CreditOutcome {
    pub fn entitlement(&self) -> &Entitlement {
        match self {
            CreditOutcome::Upgraded(e)
            | CreditOutcome::Unchanged(e)
            | CreditOutcome::AlreadyApplied(e) => e,
        }
    }
}

/// Why crediting gave up.
#[derive(Debug, Clone, Error)]
pub enum CreditError {
    /// Every try failed before anything was written.
    #[error("could not read entitlement: {0}")]
    ReadFailed(DomainError),

    /// At least one write was attempted; its effect is unknown.
    #[error("could not write entitlement: {0}")]
    WriteFailed(DomainError),
}

pub struct EntitlementCrediter {
    store: Arc<dyn EntitlementStore>,
    config: CreditConfig,
}

impl EntitlementCrediter {
    pub fn new(store: Arc<dyn EntitlementStore>, config: CreditConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CreditConfig {
        &self.config
    }

    /// Applies `plan` bought with `payment_id` to `user_id`'s entitlement,
    /// retrying with backoff.
    ///
    /// Safe to call again for the same payment: once its write has landed
    /// the stored row carries `payment_id` and nothing more is written.
    pub async fn credit(
        &self,
        user_id: &UserId,
        plan: &Plan,
        payment_id: &PaymentId,
    ) -> Result<CreditOutcome, CreditError> {
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut wrote = false;
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }

            let current = match self.bounded(self.store.get_entitlement(user_id), "read").await {
                Ok(current) => current,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, attempt, error = %e, "Entitlement read failed");
                    last_error = Some(e);
                    continue;
                }
            };

            if current.was_credited_by(payment_id) {
                tracing::info!(user_id = %user_id, payment_id = %payment_id, "Payment already credited");
                return Ok(CreditOutcome::AlreadyApplied(current));
            }

            let updated = match current.apply_plan(plan, Timestamp::now(), self.config.renewal_policy) {
                EntitlementChange::Unchanged => return Ok(CreditOutcome::Unchanged(current)),
                EntitlementChange::Upgraded(updated) => updated.with_last_payment(payment_id.clone()),
            };

            wrote = true;
            match self.bounded(self.store.update_entitlement(&updated), "write").await {
                Ok(()) => return Ok(CreditOutcome::Upgraded(updated)),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, attempt, error = %e, "Entitlement write failed");
                    last_error = Some(e);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| DomainError::database("entitlement credit gave up without an error"));
        if wrote {
            Err(CreditError::WriteFailed(error))
        } else {
            Err(CreditError::ReadFailed(error))
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, DomainError>>,
        what: &str,
    ) -> Result<T, DomainError> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::database(format!("entitlement {} timed out", what))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::domain::billing::{Role, MAX_LIFETIME, PRO_MONTHLY};

    fn config(attempts: u32) -> CreditConfig {
        CreditConfig {
            renewal_policy: RenewalPolicy::ExtendRemaining,
            max_attempts: attempts,
            initial_backoff: Duration::from_millis(1),
            store_timeout: Duration::from_secs(1),
        }
    }

    fn crediter(store: Arc<InMemoryEntitlementStore>, attempts: u32) -> EntitlementCrediter {
        EntitlementCrediter::new(store, config(attempts))
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn payment(id: &str) -> PaymentId {
        PaymentId::new(id).unwrap()
    }

    #[tokio::test]
    async fn free_user_is_upgraded() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let outcome = crediter(store.clone(), 3)
            .credit(&user(), &PRO_MONTHLY, &payment("pay_1"))
            .await
            .unwrap();

        assert!(matches!(outcome, CreditOutcome::Upgraded(_)));
        let stored = store.stored(&user()).await.unwrap();
        assert_eq!(stored.role, Role::Pro);
        assert!(stored.was_credited_by(&payment("pay_1")));
    }

    #[tokio::test]
    async fn max_user_buying_pro_is_not_written() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let crediter = crediter(store.clone(), 3);
        crediter
            .credit(&user(), &MAX_LIFETIME, &payment("pay_1"))
            .await
            .unwrap();

        let outcome = crediter
            .credit(&user(), &PRO_MONTHLY, &payment("pay_2"))
            .await
            .unwrap();

        assert!(matches!(outcome, CreditOutcome::Unchanged(_)));
        assert_eq!(outcome.entitlement().role, Role::Max);
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn same_payment_is_only_applied_once() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let crediter = crediter(store.clone(), 3);
        let first = crediter
            .credit(&user(), &PRO_MONTHLY, &payment("pay_1"))
            .await
            .unwrap();

        let second = crediter
            .credit(&user(), &PRO_MONTHLY, &payment("pay_1"))
            .await
            .unwrap();

        assert!(matches!(second, CreditOutcome::AlreadyApplied(_)));
        assert_eq!(
            second.entitlement().subscription_end_date,
            first.entitlement().subscription_end_date
        );
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn different_payment_extends_again() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let crediter = crediter(store.clone(), 3);
        let first = crediter
            .credit(&user(), &PRO_MONTHLY, &payment("pay_1"))
            .await
            .unwrap();

        let second = crediter
            .credit(&user(), &PRO_MONTHLY, &payment("pay_2"))
            .await
            .unwrap();

        assert!(matches!(second, CreditOutcome::Upgraded(_)));
        assert!(
            second.entitlement().subscription_end_date > first.entitlement().subscription_end_date
        );
        assert_eq!(store.update_count(), 2);
    }

    #[tokio::test]
    async fn transient_write_failure_is_retried() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        store.fail_next_updates(2);

        let outcome = crediter(store.clone(), 3)
            .credit(&user(), &PRO_MONTHLY, &payment("pay_1"))
            .await;

        assert!(outcome.is_ok());
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn persistent_write_failure_gives_up() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        store.fail_next_updates(u32::MAX);

        let err = crediter(store.clone(), 3)
            .credit(&user(), &PRO_MONTHLY, &payment("pay_1"))
            .await
            .unwrap_err();

        assert!(matches!(err, CreditError::WriteFailed(_)));
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn write_slower_than_store_timeout_is_a_write_failure() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        store.delay_updates(Some(Duration::from_millis(500)));
        let crediter = EntitlementCrediter::new(
            store.clone(),
            CreditConfig {
                store_timeout: Duration::from_millis(20),
                ..config(1)
            },
        );

        let err = crediter
            .credit(&user(), &PRO_MONTHLY, &payment("pay_1"))
            .await
            .unwrap_err();

        assert!(matches!(err, CreditError::WriteFailed(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn worst_case_duration_covers_every_store_call_and_backoff() {
        let config = CreditConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            store_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        // 3 reads + 3 writes, then 100ms + 200ms of backoff
        assert_eq!(config.worst_case_duration(), Duration::from_millis(6_300));
    }
}
