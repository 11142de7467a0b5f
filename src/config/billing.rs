//! Billing configuration
//!
//! Knobs for crediting entitlements and for the credit reconciler.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::billing::RenewalPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// How a pro purchase treats an already active pro window
    #[serde(default)]
    pub renewal_policy: RenewalPolicy,

    /// Tries per entitlement write, including the first
    #[serde(default = "default_write_attempts")]
    pub entitlement_write_attempts: u32,

    /// Backoff before the second write try; doubles afterwards
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Upper bound on one entitlement read or write
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Age after which an in-flight claim may be taken over
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,

    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    #[serde(default = "default_reconcile_batch_size")]
    pub reconcile_batch_size: usize,
}

impl BillingConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// The lease must outlive a gateway call plus the longest a credit can
    /// take, or a live verifier could lose its claim mid-credit.
    pub fn validate(&self, gateway_timeout: Duration) -> Result<(), ValidationError> {
        if self.entitlement_write_attempts == 0 || self.entitlement_write_attempts > 10 {
            return Err(ValidationError::InvalidWriteAttempts);
        }
        if self.store_timeout_ms == 0 || self.store_timeout_ms > 60_000 {
            return Err(ValidationError::InvalidStoreTimeout);
        }
        if self.reconcile_interval_secs == 0 {
            return Err(ValidationError::InvalidReconcileInterval);
        }
        if self.claim_lease() <= gateway_timeout + self.worst_case_credit() {
            return Err(ValidationError::ClaimLeaseTooShort);
        }
        Ok(())
    }

    /// A read and a write per attempt, each bounded by the store timeout,
    /// plus the backoff between attempts.
    pub fn worst_case_credit(&self) -> Duration {
        let store_calls = self.entitlement_write_attempts.saturating_mul(2);
        self.store_timeout().saturating_mul(store_calls) + self.worst_case_backoff()
    }

    fn worst_case_backoff(&self) -> Duration {
        let doublings = self.entitlement_write_attempts.saturating_sub(1);
        (0..doublings).fold(Duration::ZERO, |total, i| {
            total + self.retry_backoff().saturating_mul(1u32 << i.min(16))
        })
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            renewal_policy: RenewalPolicy::default(),
            entitlement_write_attempts: default_write_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            store_timeout_ms: default_store_timeout(),
            claim_lease_secs: default_claim_lease(),
            reconcile_interval_secs: default_reconcile_interval(),
            reconcile_batch_size: default_reconcile_batch_size(),
        }
    }
}

fn default_write_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    100
}

fn default_store_timeout() -> u64 {
    5_000
}

fn default_claim_lease() -> u64 {
    120
}

fn default_reconcile_interval() -> u64 {
    30
}

fn default_reconcile_batch_size() -> usize {
    50
}
