//! Verification attempt lifecycle.
//!
//! A single verify request walks these states in order. Any non-terminal state
//! can abort with a reason; `Done` and `Aborted` are terminal.
//!
//! ```text
//! Received -> SignatureChecked -> StatusFetched -> PlanResolved
//!          -> EntitlementUpdated -> LedgerRecorded -> Done
//!
//! PlanResolved       -> Done   (payment already credited)
//! EntitlementUpdated -> Done   (ledger append deferred to reconciler)
//! any non-terminal   -> Aborted(reason)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Why a verification attempt stopped before granting anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    BadRequest,
    InvalidSignature,
    PaymentNotSuccessful,
    OrderMismatch,
    UserMismatch,
    UnknownPlanAmount,
    GatewayUnreachable,
    VerificationInProgress,
    StorageUnavailable,
    EntitlementWriteFailed,
}

impl AbortReason {
    /// Wire code returned to clients in the `error` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::BadRequest => "bad_request",
            AbortReason::InvalidSignature => "invalid_signature",
            AbortReason::PaymentNotSuccessful => "payment_not_successful",
            AbortReason::OrderMismatch => "order_mismatch",
            AbortReason::UserMismatch => "user_mismatch",
            AbortReason::UnknownPlanAmount => "unknown_plan_amount",
            AbortReason::GatewayUnreachable => "gateway_unreachable",
            AbortReason::VerificationInProgress => "verification_in_progress",
            AbortReason::StorageUnavailable => "storage_unavailable",
            AbortReason::EntitlementWriteFailed => "entitlement_write_failed",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum VerificationState {
    Received,
    SignatureChecked,
    StatusFetched,
    PlanResolved,
    EntitlementUpdated,
    LedgerRecorded,
    Done,
    Aborted(AbortReason),
}

impl VerificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationState::Received => "received",
            VerificationState::SignatureChecked => "signature_checked",
            VerificationState::StatusFetched => "status_fetched",
            VerificationState::PlanResolved => "plan_resolved",
            VerificationState::EntitlementUpdated => "entitlement_updated",
            VerificationState::LedgerRecorded => "ledger_recorded",
            VerificationState::Done => "done",
            VerificationState::Aborted(_) => "aborted",
        }
    }
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationState::Aborted(reason) => write!(f, "aborted({})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

impl StateMachine for VerificationState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use VerificationState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(target, Aborted(_)) {
            return true;
        }

        matches!(
            (self, target),
            (Received, SignatureChecked)
                | (SignatureChecked, StatusFetched)
                | (StatusFetched, PlanResolved)
                | (PlanResolved, EntitlementUpdated)
                | (PlanResolved, Done)
                | (EntitlementUpdated, LedgerRecorded)
                | (EntitlementUpdated, Done)
                | (LedgerRecorded, Done)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(self, VerificationState::Done | VerificationState::Aborted(_))
    }
}

/// Tracks the current state of one attempt and refuses illegal jumps.
#[derive(Debug, Clone)]
pub struct VerificationAttempt {
    state: VerificationState,
}

impl VerificationAttempt {
    pub fn start() -> Self {
        Self {
            state: VerificationState::Received,
        }
    }

    pub fn state(&self) -> VerificationState {
        self.state
    }

    /// Moves to `next`, returning the state that was left.
    pub fn advance(&mut self, next: VerificationState) -> Result<VerificationState, ValidationError> {
        let previous = self.state;
        self.state = previous.transition_to(next)?;
        Ok(previous)
    }

    /// Moves to `Aborted(reason)` unless already terminal.
    pub fn abort(&mut self, reason: AbortReason) -> VerificationState {
        let previous = self.state;
        if !previous.is_terminal() {
            self.state = VerificationState::Aborted(reason);
        }
        previous
    }
}

impl Default for VerificationAttempt {
    fn default() -> Self {
        Self::start()
    }
}
