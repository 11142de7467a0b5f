//! CreditReconciler - Background worker that settles unfinished credits.
//!
//! Verification hands work to this worker in two cases:
//!
//! 1. **credit_pending** - the entitlement write gave up after retries. The
//!    reconciler re-applies the plan, then appends the ledger entry.
//! 2. **credited** - the entitlement was written but the ledger append
//!    failed. The reconciler appends the entry.
//! 3. **abandoned in_flight** - the verifier stopped touching the claim for
//!    longer than the claim lease, so its entitlement write may or may not
//!    have landed. The reconciler takes the claim over and credits it again;
//!    the payment tag on the entitlement turns a repeat into a no-op.
//!
//! All end with the claim marked `recorded`. A failed pass records the
//! error on the claim and leaves it for the next tick.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 30s | How often to scan for unsettled claims |
//! | `batch_size` | 50 | Max claims to settle per scan |
//! | `claim_lease` | 120s | Silence after which an in-flight claim is abandoned |
//!
//! ## Graceful Shutdown
//!
//! The worker listens on a watch channel and runs one final pass before
//! stopping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::application::handlers::billing::{CreditError, CreditOutcome, EntitlementCrediter};
use crate::domain::billing::{ClaimOutcome, ClaimStatus, PaymentClaim, PlanCatalog};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{PaymentClaimStore, PaymentLedger};

/// Configuration for the CreditReconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often to scan for unsettled claims.
    pub interval: Duration,

    /// Maximum claims to settle per scan.
    pub batch_size: usize,

    /// An in-flight claim untouched for this long is settled here.
    pub claim_lease: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 50,
            claim_lease: Duration::from_secs(120),
        }
    }
}

impl ReconcilerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    fn stale_before(&self, now: Timestamp) -> Timestamp {
        let lease_secs = i64::try_from(self.claim_lease.as_secs()).unwrap_or(i64::MAX);
        now.plus_secs(-lease_secs)
    }
}

/// How far `settle` got with one claim.
enum Settled {
    Recorded,
    /// A live verifier still holds the claim.
    Skipped,
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Pending credits whose entitlement is now written.
    pub credited: usize,
    /// Claims that reached `recorded`.
    pub recorded: usize,
    /// Claims left for a later pass.
    pub failed: usize,
}

pub struct CreditReconciler {
    claims: Arc<dyn PaymentClaimStore>,
    ledger: Arc<dyn PaymentLedger>,
    crediter: Arc<EntitlementCrediter>,
    catalog: PlanCatalog,
    config: ReconcilerConfig,
}

impl CreditReconciler {
    pub fn new(
        claims: Arc<dyn PaymentClaimStore>,
        ledger: Arc<dyn PaymentLedger>,
        crediter: Arc<EntitlementCrediter>,
        catalog: PlanCatalog,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            claims,
            ledger,
            crediter,
            catalog,
            config,
        }
    }

    /// Run the reconcile loop until the shutdown signal is received.
    ///
    /// Storage errors while listing claims are logged and retried on the
    /// next tick; they never stop the worker.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Credit reconciler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.tick().await;
                        tracing::info!("Credit reconciler stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        match self.run_once().await {
            Ok(report) if report != ReconcileReport::default() => {
                tracing::info!(
                    credited = report.credited,
                    recorded = report.recorded,
                    failed = report.failed,
                    "Reconciliation pass finished"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Could not list unsettled claims"),
        }
    }

    /// Settle one batch of unsettled claims.
    pub async fn run_once(&self) -> Result<ReconcileReport, DomainError> {
        let stale_before = self.config.stale_before(Timestamp::now());
        let claims = self
            .claims
            .find_unsettled(self.config.batch_size, stale_before)
            .await?;
        let mut report = ReconcileReport::default();

        for claim in claims {
            match self.settle(&claim, stale_before, &mut report).await {
                Ok(Settled::Recorded) => report.recorded += 1,
                Ok(Settled::Skipped) => {
                    tracing::debug!(payment_id = %claim.payment_id, "Claim is live again, skipping");
                }
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(
                        payment_id = %claim.payment_id,
                        status = %claim.status,
                        attempts = claim.attempts + 1,
                        error = %error,
                        "Reconciliation failed, will retry"
                    );
                    // Status may have moved during settle; record against the current one.
                    let status = match self.claims.find(&claim.payment_id).await {
                        Ok(Some(current)) => current.status,
                        _ => claim.status,
                    };
                    if let Err(e) = self
                        .claims
                        .record_failure(&claim.payment_id, status, &error)
                        .await
                    {
                        tracing::error!(payment_id = %claim.payment_id, error = %e, "Failed to record reconciliation failure");
                    }
                }
            }
        }

        Ok(report)
    }

    async fn settle(
        &self,
        claim: &PaymentClaim,
        stale_before: Timestamp,
        report: &mut ReconcileReport,
    ) -> Result<Settled, String> {
        match claim.status {
            ClaimStatus::InFlight => {
                if !self.take_over(claim, stale_before).await? {
                    return Ok(Settled::Skipped);
                }
                self.apply_credit(claim, report).await?;
            }
            ClaimStatus::CreditPending => self.apply_credit(claim, report).await?,
            ClaimStatus::Credited | ClaimStatus::Recorded => {}
        }

        self.ledger.append(&claim.entry).await.map_err(|e| e.to_string())?;
        self.claims
            .mark_recorded(&claim.payment_id)
            .await
            .map_err(|e| e.to_string())?;

        tracing::info!(payment_id = %claim.payment_id, "Ledger entry reconciled");
        Ok(Settled::Recorded)
    }

    /// Claim an abandoned in-flight payment for this worker.
    async fn take_over(&self, claim: &PaymentClaim, stale_before: Timestamp) -> Result<bool, String> {
        let fresh = PaymentClaim::in_flight(claim.entry.clone(), Timestamp::now());
        let outcome = self
            .claims
            .try_claim(&fresh, stale_before)
            .await
            .map_err(|e| e.to_string())?;

        if outcome.is_owned() {
            tracing::warn!(
                payment_id = %claim.payment_id,
                user_id = %claim.user_id,
                "Took over abandoned payment claim"
            );
        }
        Ok(matches!(outcome, ClaimOutcome::Acquired | ClaimOutcome::TakenOver))
    }

    async fn apply_credit(&self, claim: &PaymentClaim, report: &mut ReconcileReport) -> Result<(), String> {
        let entry = &claim.entry;
        let plan = self
            .catalog
            .plan_for(entry.plan)
            .ok_or_else(|| format!("plan '{}' missing from catalog {}", entry.plan, self.catalog.version))?;

        let outcome = self
            .crediter
            .credit(&claim.user_id, &plan, &claim.payment_id)
            .await
            .map_err(|e| match e {
                CreditError::ReadFailed(e) | CreditError::WriteFailed(e) => e.to_string(),
            })?;
        self.claims
            .mark_credited(&claim.payment_id)
            .await
            .map_err(|e| e.to_string())?;
        report.credited += 1;

        tracing::info!(
            payment_id = %claim.payment_id,
            user_id = %claim.user_id,
            role = %outcome.entitlement().role,
            already_applied = matches!(outcome, CreditOutcome::AlreadyApplied(_)),
            "Pending credit applied"
        );
        Ok(())
    }
}
