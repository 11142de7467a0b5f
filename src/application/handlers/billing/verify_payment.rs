//! VerifyPaymentHandler - Command handler that turns a completed checkout
//! into an entitlement change.
//!
//! ## Steps
//!
//! 1. Validate the submitted ids
//! 2. Check the checkout signature
//! 3. Fetch the payment from the gateway (bounded by a timeout)
//! 4. Resolve the plan from the gateway-reported amount
//! 5. Claim the payment id, then credit the entitlement
//! 6. Append the ledger entry
//!
//! ## Race Condition Handling
//!
//! Duplicate submissions of the same payment are serialized by the claim
//! store: the first `try_claim` wins, later ones see the claim status and
//! either report success (already credited) or ask the client to retry.
//!
//! Steps 5 and 6 run in a spawned task. If the client disconnects while they
//! run, the writes still complete.
//!
//! A claim whose `credited` mark cannot be stored stays `in_flight`. Once its
//! lease runs out, a resubmission or the reconciler takes it over; the payment
//! tag on the entitlement keeps that second pass from crediting again.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{
    ClaimOutcome, ClaimStatus, Entitlement, LedgerEntry, PaymentClaim, Plan, PlanCatalog,
    PlanKind, SignatureVerifier, VerificationAttempt, VerificationError, VerificationState,
    VerifiedPayment,
};
use crate::domain::foundation::{DomainError, OrderId, PaymentId, Timestamp, UserId};
use crate::ports::{AppendOutcome, PaymentClaimStore, PaymentGateway, PaymentLedger};

use super::credit_entitlement::{CreditError, CreditOutcome, EntitlementCrediter};

/// Command carrying what the client received from checkout.
#[derive(Debug, Clone)]
pub struct VerifyPaymentCommand {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub user_id: String,
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyPaymentResult {
    pub plan: PlanKind,
    pub payment_id: PaymentId,
    /// True when this payment had been credited by an earlier request.
    pub already_processed: bool,
    /// Entitlement after crediting; `None` for already processed payments.
    pub entitlement: Option<Entitlement>,
    /// False when the ledger append was deferred to the reconciler.
    pub ledger_recorded: bool,
}

/// Timing settings for verification.
#[derive(Debug, Clone)]
pub struct VerifyPaymentConfig {
    /// Upper bound on the gateway lookup.
    pub gateway_timeout: Duration,
    /// An in-flight claim older than this may be taken over.
    pub claim_lease: Duration,
}

impl Default for VerifyPaymentConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(10),
            claim_lease: Duration::from_secs(120),
        }
    }
}

/// Ids that passed input validation.
struct ValidatedIds {
    order_id: OrderId,
    payment_id: PaymentId,
    user_id: UserId,
}

/// Handler for payment verification.
///
/// Stateless apart from its shared ports, so one instance serves all requests.
pub struct VerifyPaymentHandler {
    verifier: SignatureVerifier,
    gateway: Arc<dyn PaymentGateway>,
    crediter: Arc<EntitlementCrediter>,
    ledger: Arc<dyn PaymentLedger>,
    claims: Arc<dyn PaymentClaimStore>,
    catalog: PlanCatalog,
    config: VerifyPaymentConfig,
}

impl VerifyPaymentHandler {
    pub fn new(
        verifier: SignatureVerifier,
        gateway: Arc<dyn PaymentGateway>,
        crediter: Arc<EntitlementCrediter>,
        ledger: Arc<dyn PaymentLedger>,
        claims: Arc<dyn PaymentClaimStore>,
        catalog: PlanCatalog,
        config: VerifyPaymentConfig,
    ) -> Self {
        Self {
            verifier,
            gateway,
            crediter,
            ledger,
            claims,
            catalog,
            config,
        }
    }

    pub async fn handle(
        &self,
        cmd: VerifyPaymentCommand,
    ) -> Result<VerifyPaymentResult, VerificationError> {
        let mut attempt = VerificationAttempt::start();
        let result = self.run(&cmd, &mut attempt).await;

        if let Err(err) = &result {
            let previous = attempt.abort(err.reason());
            tracing::debug!(
                payment_id = %cmd.payment_id,
                from = %previous,
                to = %attempt.state(),
                "Verification aborted"
            );
        }
        result
    }

    async fn run(
        &self,
        cmd: &VerifyPaymentCommand,
        attempt: &mut VerificationAttempt,
    ) -> Result<VerifyPaymentResult, VerificationError> {
        // 1. Received
        let ids = validate(cmd)?;

        // 2. SignatureChecked
        if !self
            .verifier
            .verify(ids.order_id.as_str(), ids.payment_id.as_str(), cmd.signature.trim())
        {
            tracing::warn!(
                security_event = "invalid_payment_signature",
                order_id = %ids.order_id,
                payment_id = %ids.payment_id,
                user_id = %ids.user_id,
                "Payment signature verification failed"
            );
            return Err(VerificationError::InvalidSignature);
        }
        advance(attempt, VerificationState::SignatureChecked, &ids.payment_id);

        // 3. StatusFetched
        let payment = self.fetch_verified_payment(&ids).await?;
        advance(attempt, VerificationState::StatusFetched, &ids.payment_id);

        // 4. PlanResolved
        let plan = self.resolve_plan(&payment, &ids)?;
        advance(attempt, VerificationState::PlanResolved, &ids.payment_id);

        // 5. EntitlementUpdated
        if self.already_credited(&ids).await? {
            tracing::info!(
                payment_id = %ids.payment_id,
                user_id = %ids.user_id,
                "Payment already credited, nothing to do"
            );
            advance(attempt, VerificationState::Done, &ids.payment_id);
            return Ok(VerifyPaymentResult {
                plan: plan.kind,
                payment_id: ids.payment_id,
                already_processed: true,
                entitlement: None,
                ledger_recorded: true,
            });
        }

        let entry = LedgerEntry::for_payment(ids.user_id.clone(), &payment, &plan);
        match self.claim(&entry).await? {
            ClaimOutcome::Acquired | ClaimOutcome::TakenOver => {}
            ClaimOutcome::Held(status) if status.is_credited() => {
                advance(attempt, VerificationState::Done, &ids.payment_id);
                return Ok(VerifyPaymentResult {
                    plan: plan.kind,
                    payment_id: ids.payment_id,
                    already_processed: true,
                    entitlement: None,
                    ledger_recorded: status == ClaimStatus::Recorded,
                });
            }
            ClaimOutcome::Held(ClaimStatus::CreditPending) => {
                return Err(VerificationError::entitlement_write_failed(
                    "credit already pending reconciliation",
                ));
            }
            ClaimOutcome::Held(_) => return Err(VerificationError::VerificationInProgress),
        }

        let job = CreditJob {
            crediter: self.crediter.clone(),
            ledger: self.ledger.clone(),
            claims: self.claims.clone(),
            plan,
            entry,
        };
        let outcome = tokio::spawn(job.run())
            .await
            .map_err(|e| VerificationError::storage_unavailable(e.to_string()))??;

        advance(attempt, VerificationState::EntitlementUpdated, &ids.payment_id);
        if outcome.ledger_recorded {
            advance(attempt, VerificationState::LedgerRecorded, &ids.payment_id);
        }

        // 7. Done
        advance(attempt, VerificationState::Done, &ids.payment_id);
        tracing::info!(
            payment_id = %ids.payment_id,
            user_id = %ids.user_id,
            plan = %plan.kind,
            upgraded = matches!(outcome.credit, CreditOutcome::Upgraded(_)),
            "Payment verified"
        );

        Ok(VerifyPaymentResult {
            plan: plan.kind,
            payment_id: ids.payment_id,
            already_processed: false,
            entitlement: Some(outcome.credit.entitlement().clone()),
            ledger_recorded: outcome.ledger_recorded,
        })
    }

    async fn fetch_verified_payment(
        &self,
        ids: &ValidatedIds,
    ) -> Result<VerifiedPayment, VerificationError> {
        let fetched = tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway.fetch_payment(&ids.payment_id),
        )
        .await;

        let payment = match fetched {
            Ok(Ok(payment)) => payment,
            Ok(Err(e)) => {
                tracing::warn!(payment_id = %ids.payment_id, error = %e, retryable = e.is_retryable(), "Gateway payment lookup failed");
                return Err(VerificationError::gateway_unreachable(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(
                    payment_id = %ids.payment_id,
                    timeout_ms = self.config.gateway_timeout.as_millis() as u64,
                    "Gateway payment lookup timed out"
                );
                return Err(VerificationError::gateway_unreachable("gateway lookup timed out"));
            }
        };

        match &payment.order_id {
            Some(order_id) if order_id == &ids.order_id => {}
            other => {
                tracing::warn!(
                    payment_id = %ids.payment_id,
                    requested_order = %ids.order_id,
                    gateway_order = ?other.as_ref().map(|o| o.as_str()),
                    "Payment belongs to a different order"
                );
                return Err(VerificationError::OrderMismatch {
                    requested: ids.order_id.to_string(),
                    actual: other.as_ref().map(|o| o.to_string()).unwrap_or_default(),
                });
            }
        }

        if let Some(owner) = &payment.notes_user_id {
            if owner != ids.user_id.as_str() {
                tracing::warn!(
                    security_event = "payment_user_mismatch",
                    payment_id = %ids.payment_id,
                    user_id = %ids.user_id,
                    "Payment submitted by an account that did not order it"
                );
                return Err(VerificationError::UserMismatch);
            }
        }

        VerifiedPayment::new(ids.order_id.clone(), payment, Timestamp::now()).map_err(|e| {
            tracing::info!(payment_id = %ids.payment_id, status = %e.status, "Payment not successful");
            VerificationError::PaymentNotSuccessful(e.status)
        })
    }

    fn resolve_plan(
        &self,
        payment: &VerifiedPayment,
        ids: &ValidatedIds,
    ) -> Result<Plan, VerificationError> {
        let plan = if payment.currency().eq_ignore_ascii_case(self.catalog.currency) {
            self.catalog.resolve(payment.amount_minor())
        } else {
            None
        };

        plan.ok_or_else(|| {
            tracing::error!(
                operator_alert = true,
                payment_id = %ids.payment_id,
                order_id = %ids.order_id,
                user_id = %ids.user_id,
                amount = payment.amount_minor(),
                currency = payment.currency(),
                catalog_version = self.catalog.version,
                "Captured payment does not match any plan"
            );
            VerificationError::UnknownPlanAmount {
                amount: payment.amount_minor(),
                currency: payment.currency().to_string(),
            }
        })
    }

    /// Fast path: the ledger or a settled claim already covers this payment.
    async fn already_credited(&self, ids: &ValidatedIds) -> Result<bool, VerificationError> {
        if let Some(claim) = self.claims.find(&ids.payment_id).await.map_err(storage_error)? {
            if claim.user_id != ids.user_id {
                tracing::warn!(
                    security_event = "payment_user_mismatch",
                    payment_id = %ids.payment_id,
                    user_id = %ids.user_id,
                    "Payment already claimed by another account"
                );
                return Err(VerificationError::UserMismatch);
            }
            if claim.status.is_credited() {
                return Ok(true);
            }
        }
        self.ledger.has(&ids.payment_id).await.map_err(storage_error)
    }

    async fn claim(&self, entry: &LedgerEntry) -> Result<ClaimOutcome, VerificationError> {
        let now = Timestamp::now();
        let lease_secs = i64::try_from(self.config.claim_lease.as_secs()).unwrap_or(i64::MAX);
        let claim = PaymentClaim::in_flight(entry.clone(), now);

        let outcome = self
            .claims
            .try_claim(&claim, now.plus_secs(-lease_secs))
            .await
            .map_err(storage_error)?;

        if outcome == ClaimOutcome::TakenOver {
            tracing::warn!(payment_id = %entry.payment_id, "Took over stale payment claim");
        }
        Ok(outcome)
    }
}

/// Storage failures before anything was written are safe to retry.
fn storage_error(err: DomainError) -> VerificationError {
    tracing::error!(error = %err, "Payment storage unavailable");
    VerificationError::storage_unavailable(err.to_string())
}

fn validate(cmd: &VerifyPaymentCommand) -> Result<ValidatedIds, VerificationError> {
    if cmd.signature.trim().is_empty() {
        return Err(VerificationError::bad_request("signature is required"));
    }
    Ok(ValidatedIds {
        order_id: OrderId::new(cmd.order_id.as_str())?,
        payment_id: PaymentId::new(cmd.payment_id.as_str())?,
        user_id: UserId::new(cmd.user_id.as_str())?,
    })
}

fn advance(attempt: &mut VerificationAttempt, next: VerificationState, payment_id: &PaymentId) {
    match attempt.advance(next) {
        Ok(previous) => {
            tracing::debug!(payment_id = %payment_id, from = %previous, to = %next, "Verification step");
        }
        Err(e) => {
            tracing::error!(payment_id = %payment_id, error = %e, "Illegal verification step");
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Side-effecting steps
// ════════════════════════════════════════════════════════════════════════════════

struct CreditJobOutcome {
    credit: CreditOutcome,
    ledger_recorded: bool,
}

/// Entitlement write and ledger append for one claimed payment.
struct CreditJob {
    crediter: Arc<EntitlementCrediter>,
    ledger: Arc<dyn PaymentLedger>,
    claims: Arc<dyn PaymentClaimStore>,
    plan: Plan,
    entry: LedgerEntry,
}

impl CreditJob {
    async fn run(self) -> Result<CreditJobOutcome, VerificationError> {
        let payment_id = &self.entry.payment_id;

        let credit = match self
            .crediter
            .credit(&self.entry.user_id, &self.plan, payment_id)
            .await
        {
            Ok(credit) => credit,
            Err(CreditError::ReadFailed(e)) => {
                tracing::error!(payment_id = %payment_id, error = %e, "Entitlement unreadable, releasing claim");
                if let Err(release_err) = self.claims.release(payment_id).await {
                    tracing::error!(payment_id = %payment_id, error = %release_err, "Failed to release claim");
                }
                return Err(VerificationError::storage_unavailable(e.to_string()));
            }
            Err(CreditError::WriteFailed(e)) => {
                tracing::error!(
                    payment_id = %payment_id,
                    user_id = %self.entry.user_id,
                    error = %e,
                    "Entitlement write failed, credit left pending"
                );
                if let Err(mark_err) = self.claims.mark_credit_pending(payment_id, &e.to_string()).await {
                    tracing::error!(payment_id = %payment_id, error = %mark_err, "Failed to mark credit pending");
                }
                return Err(VerificationError::entitlement_write_failed(e.to_string()));
            }
        };

        self.mark_credited(payment_id).await;

        let ledger_recorded = match self.ledger.append(&self.entry).await {
            Ok(outcome) => {
                if outcome == AppendOutcome::AlreadyExists {
                    tracing::info!(payment_id = %payment_id, "Ledger entry already present");
                }
                if let Err(e) = self.claims.mark_recorded(payment_id).await {
                    tracing::error!(payment_id = %payment_id, error = %e, "Failed to mark claim recorded");
                }
                true
            }
            Err(e) => {
                tracing::error!(
                    payment_id = %payment_id,
                    user_id = %self.entry.user_id,
                    error = %e,
                    "Ledger append failed after entitlement update, deferring to reconciler"
                );
                false
            }
        };

        Ok(CreditJobOutcome {
            credit,
            ledger_recorded,
        })
    }

    /// Retries with the crediter's backoff. A claim that stays unmarked is
    /// settled from `in_flight` by whoever takes it over next.
    async fn mark_credited(&self, payment_id: &PaymentId) {
        let config = self.crediter.config();
        let mut backoff = config.initial_backoff;

        for attempt in 1..=config.max_attempts.max(1) {
            if attempt > 1 {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            match self.claims.mark_credited(payment_id).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(payment_id = %payment_id, attempt, error = %e, "Failed to mark claim credited");
                }
            }
        }

        tracing::error!(
            payment_id = %payment_id,
            "Claim left in flight after crediting; it will be settled once its lease expires"
        );
    }
}
