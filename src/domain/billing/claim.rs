//! Payment claims - the durable per-payment mutex.
//!
//! Before touching an entitlement, a verifier claims the payment id. The claim
//! row is unique per payment id, so only one verifier can ever credit a given
//! payment. The claim then tracks how far crediting got, which lets the
//! reconciler finish work a request could not.
//!
//! ```text
//! InFlight ───────────────────► Recorded
//!    │                             ▲
//!    ├──► Credited ────────────────┘
//!    │       ▲
//!    └──► CreditPending
//! ```
//!
//! `InFlight ──► Recorded` covers a verifier whose `credited` mark was lost
//! but whose ledger append went through.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::payment::LedgerEntry;
use crate::domain::foundation::{PaymentId, StateMachine, Timestamp, UserId, ValidationError};

/// How far crediting a claimed payment has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// A verifier holds the claim and is writing the entitlement.
    InFlight,
    /// Entitlement write failed after retries; the reconciler owns it now.
    CreditPending,
    /// Entitlement written, ledger entry not yet confirmed.
    Credited,
    /// Entitlement written and ledger entry stored.
    Recorded,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::InFlight => "in_flight",
            ClaimStatus::CreditPending => "credit_pending",
            ClaimStatus::Credited => "credited",
            ClaimStatus::Recorded => "recorded",
        }
    }

    /// Whether the user has already received what this payment bought.
    pub fn is_credited(&self) -> bool {
        matches!(self, ClaimStatus::Credited | ClaimStatus::Recorded)
    }

    /// Whether the reconciler still has work to do for this claim.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, ClaimStatus::CreditPending | ClaimStatus::Credited)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_flight" => Ok(ClaimStatus::InFlight),
            "credit_pending" => Ok(ClaimStatus::CreditPending),
            "credited" => Ok(ClaimStatus::Credited),
            "recorded" => Ok(ClaimStatus::Recorded),
            other => Err(ValidationError::invalid_format(
                "claim_status",
                format!("unknown value '{}'", other),
            )),
        }
    }
}

impl StateMachine for ClaimStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, target),
            (InFlight, Credited)
                | (InFlight, CreditPending)
                | (InFlight, Recorded)
                | (CreditPending, Credited)
                | (Credited, Recorded)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ClaimStatus::Recorded)
    }
}

/// A claim on one payment id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentClaim {
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub status: ClaimStatus,
    /// Ledger entry to append once the entitlement is written.
    pub entry: LedgerEntry,
    pub claimed_at: Timestamp,
    pub updated_at: Timestamp,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PaymentClaim {
    /// A fresh in-flight claim for the payment described by `entry`.
    pub fn in_flight(entry: LedgerEntry, now: Timestamp) -> Self {
        Self {
            payment_id: entry.payment_id.clone(),
            user_id: entry.user_id.clone(),
            status: ClaimStatus::InFlight,
            entry,
            claimed_at: now,
            updated_at: now,
            attempts: 0,
            last_error: None,
        }
    }

    /// An in-flight claim whose holder has been silent since before `cutoff`.
    pub fn is_stale(&self, cutoff: Timestamp) -> bool {
        self.status == ClaimStatus::InFlight && self.updated_at.is_before(&cutoff)
    }

    /// Whether the reconciler should pick this claim up, treating in-flight
    /// claims untouched since `cutoff` as abandoned.
    pub fn is_unsettled(&self, cutoff: Timestamp) -> bool {
        self.status.needs_reconciliation() || self.is_stale(cutoff)
    }
}

/// Result of trying to claim a payment id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// No claim existed; the caller now holds it.
    Acquired,
    /// A stale in-flight claim was replaced; the caller now holds it.
    TakenOver,
    /// Another verifier got there first.
    Held(ClaimStatus),
}

impl ClaimOutcome {
    pub fn is_owned(&self) -> bool {
        matches!(self, ClaimOutcome::Acquired | ClaimOutcome::TakenOver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::payment::GatewayStatus;
    use crate::domain::billing::plan::PlanKind;
    use crate::domain::billing::tier::SubscriptionType;
    use crate::domain::foundation::OrderId;

    fn entry() -> LedgerEntry {
        LedgerEntry {
            payment_id: PaymentId::new("pay_1").unwrap(),
            order_id: OrderId::new("order_1").unwrap(),
            user_id: UserId::new("user-1").unwrap(),
            amount_minor: 14_900,
            currency: "INR".to_string(),
            status: GatewayStatus::Captured,
            plan: PlanKind::Pro,
            subscription_type: SubscriptionType::ProMonthly,
            recorded_at: Timestamp::now(),
        }
    }

    #[test]
    fn credit_path_is_valid() {
        let status = ClaimStatus::InFlight
            .transition_to(ClaimStatus::Credited)
            .and_then(|s| s.transition_to(ClaimStatus::Recorded))
            .unwrap();
        assert!(status.is_terminal());
    }

    #[test]
    fn in_flight_claim_can_be_recorded_directly() {
        assert!(ClaimStatus::InFlight.can_transition_to(&ClaimStatus::Recorded));
    }

    #[test]
    fn pending_credit_can_be_settled() {
        assert!(ClaimStatus::CreditPending.can_transition_to(&ClaimStatus::Credited));
        assert!(!ClaimStatus::CreditPending.can_transition_to(&ClaimStatus::Recorded));
    }

    #[test]
    fn recorded_claim_never_moves() {
        for target in [
            ClaimStatus::InFlight,
            ClaimStatus::CreditPending,
            ClaimStatus::Credited,
        ] {
            assert!(!ClaimStatus::Recorded.can_transition_to(&target));
        }
    }

    #[test]
    fn credited_statuses() {
        assert!(ClaimStatus::Credited.is_credited());
        assert!(ClaimStatus::Recorded.is_credited());
        assert!(!ClaimStatus::InFlight.is_credited());
        assert!(!ClaimStatus::CreditPending.is_credited());
    }

    #[test]
    fn status_round_trips_through_storage_string() {
        for status in [
            ClaimStatus::InFlight,
            ClaimStatus::CreditPending,
            ClaimStatus::Credited,
            ClaimStatus::Recorded,
        ] {
            assert_eq!(status.as_str().parse::<ClaimStatus>().unwrap(), status);
        }
    }

    #[test]
    fn new_claim_is_in_flight_for_entry_owner() {
        let claim = PaymentClaim::in_flight(entry(), Timestamp::now());
        assert_eq!(claim.status, ClaimStatus::InFlight);
        assert_eq!(claim.payment_id.as_str(), "pay_1");
        assert_eq!(claim.user_id.as_str(), "user-1");
        assert_eq!(claim.attempts, 0);
    }

    #[test]
    fn only_old_in_flight_claims_are_stale() {
        let now = Timestamp::now();
        let mut claim = PaymentClaim::in_flight(entry(), now.plus_secs(-120));
        assert!(claim.is_stale(now.plus_secs(-60)));
        assert!(!claim.is_stale(now.plus_secs(-180)));

        claim.status = ClaimStatus::CreditPending;
        assert!(!claim.is_stale(now.plus_secs(-60)));
    }

    #[test]
    fn abandoned_in_flight_claim_is_unsettled() {
        let now = Timestamp::now();
        let mut claim = PaymentClaim::in_flight(entry(), now.plus_secs(-120));
        assert!(claim.is_unsettled(now.plus_secs(-60)));
        assert!(!claim.is_unsettled(now.plus_secs(-180)));

        claim.status = ClaimStatus::Credited;
        assert!(claim.is_unsettled(now.plus_secs(-180)));

        claim.status = ClaimStatus::Recorded;
        assert!(!claim.is_unsettled(now));
    }
}
