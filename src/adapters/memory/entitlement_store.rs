//! In-memory entitlement store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::Entitlement;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::EntitlementStore;

/// Entitlement store backed by a hash map, with write-failure and latency
/// injection.
#[derive(Default)]
pub struct InMemoryEntitlementStore {
    rows: RwLock<HashMap<UserId, Entitlement>>,
    updates: AtomicU32,
    failing_updates: AtomicU32,
    failing_reads: AtomicU32,
    update_delay: Mutex<Option<Duration>>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a row in place as if the user already had it.
    pub async fn seed(&self, entitlement: Entitlement) {
        self.rows
            .write()
            .await
            .insert(entitlement.user_id.clone(), entitlement);
    }

    /// Make the next `count` updates fail. `u32::MAX` fails them all.
    pub fn fail_next_updates(&self, count: u32) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` reads fail. `u32::MAX` fails them all.
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Hold every update for `delay` before it lands.
    pub fn delay_updates(&self, delay: Option<Duration>) {
        *self.update_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Number of successful updates so far.
    pub fn update_count(&self) -> u32 {
        self.updates.load(Ordering::SeqCst)
    }

    pub async fn stored(&self, user_id: &UserId) -> Option<Entitlement> {
        self.rows.read().await.get(user_id).cloned()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn get_entitlement(&self, user_id: &UserId) -> Result<Entitlement, DomainError> {
        if Self::take_failure(&self.failing_reads) {
            return Err(DomainError::database("simulated entitlement read failure"));
        }
        Ok(self
            .rows
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Entitlement::free(user_id.clone())))
    }

    async fn update_entitlement(&self, entitlement: &Entitlement) -> Result<(), DomainError> {
        let delay = *self.update_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.failing_updates) {
            return Err(DomainError::database("simulated entitlement write failure"));
        }
        self.rows
            .write()
            .await
            .insert(entitlement.user_id.clone(), entitlement.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::Role;

    #[tokio::test]
    async fn missing_row_reads_as_free() {
        let store = InMemoryEntitlementStore::new();
        let entitlement = store
            .get_entitlement(&UserId::new("user-1").unwrap())
            .await
            .unwrap();
        assert_eq!(entitlement.role, Role::Free);
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let store = InMemoryEntitlementStore::new();
        let entitlement = Entitlement::free(UserId::new("user-1").unwrap());
        store.fail_next_updates(2);

        assert!(store.update_entitlement(&entitlement).await.is_err());
        assert!(store.update_entitlement(&entitlement).await.is_err());
        assert!(store.update_entitlement(&entitlement).await.is_ok());
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn permanent_failure_never_runs_out() {
        let store = InMemoryEntitlementStore::new();
        let entitlement = Entitlement::free(UserId::new("user-1").unwrap());
        store.fail_next_updates(u32::MAX);

        for _ in 0..5 {
            assert!(store.update_entitlement(&entitlement).await.is_err());
        }
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn delayed_update_still_lands() {
        let store = InMemoryEntitlementStore::new();
        let entitlement = Entitlement::free(UserId::new("user-1").unwrap());
        store.delay_updates(Some(Duration::from_millis(10)));

        store.update_entitlement(&entitlement).await.unwrap();

        assert_eq!(store.update_count(), 1);
    }
}
