//! Entitlement - the durable authorization state on a user profile.
//!
//! Expiry is derived, never stored: a `pro` entitlement whose end date has
//! passed is read as `free` through [`Entitlement::effective_role`], whatever
//! the row still says.

use serde::{Deserialize, Serialize};

use super::plan::{Plan, PlanDuration};
use super::tier::{Role, SubscriptionType};
use crate::domain::foundation::{PaymentId, Timestamp, UserId, ValidationError};

/// How a pro purchase treats time left on an already active pro subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalPolicy {
    /// New window is `now + duration`; unused days of an active window are dropped.
    #[default]
    ResetFromNow,
    /// New window starts at the later of now and the current end date.
    ExtendRemaining,
}

/// Authorization state of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: UserId,
    pub role: Role,
    pub subscription_type: SubscriptionType,
    /// `None` for free and lifetime entitlements.
    pub subscription_end_date: Option<Timestamp>,
    /// Payment behind the most recent write, stored in the same row so a
    /// repeated credit of that payment can be recognised.
    #[serde(default)]
    pub last_payment_id: Option<PaymentId>,
}

/// Result of applying a plan to an entitlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementChange {
    /// The entitlement must be persisted with the new value.
    Upgraded(Entitlement),
    /// The purchase grants nothing the user does not already have.
    Unchanged,
}

impl Entitlement {
    /// Entitlement every account starts with.
    pub fn free(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Free,
            subscription_type: SubscriptionType::Free,
            subscription_end_date: None,
            last_payment_id: None,
        }
    }

    /// Rebuilds an entitlement from stored fields, checking the pairing rules.
    pub fn from_parts(
        user_id: UserId,
        role: Role,
        subscription_type: SubscriptionType,
        subscription_end_date: Option<Timestamp>,
    ) -> Result<Self, ValidationError> {
        let entitlement = Self {
            user_id,
            role,
            subscription_type,
            subscription_end_date,
            last_payment_id: None,
        };
        entitlement.check_invariants()?;
        Ok(entitlement)
    }

    /// Tags the entitlement with the payment that produced it.
    pub fn with_last_payment(mut self, payment_id: PaymentId) -> Self {
        self.last_payment_id = Some(payment_id);
        self
    }

    /// Whether the last write to this entitlement came from `payment_id`.
    pub fn was_credited_by(&self, payment_id: &PaymentId) -> bool {
        self.last_payment_id.as_ref() == Some(payment_id)
    }

    /// Validates the role / subscription type / end date pairing.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.subscription_type.role() != self.role {
            return Err(ValidationError::invalid_format(
                "subscription_type",
                format!(
                    "'{}' cannot be paired with role '{}'",
                    self.subscription_type, self.role
                ),
            ));
        }
        match (self.role, self.subscription_end_date) {
            (Role::Max, Some(_)) => Err(ValidationError::invalid_format(
                "subscription_end_date",
                "lifetime entitlements never expire",
            )),
            (Role::Pro, None) => Err(ValidationError::invalid_format(
                "subscription_end_date",
                "pro entitlements require an end date",
            )),
            _ => Ok(()),
        }
    }

    /// Whether a paid entitlement still grants access at `now`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        match self.role {
            Role::Free => false,
            Role::Max => true,
            Role::Pro => self
                .subscription_end_date
                .map(|end| end.is_after(&now))
                .unwrap_or(false),
        }
    }

    /// Role any consumer must act on at `now`.
    pub fn effective_role(&self, now: Timestamp) -> Role {
        match self.role {
            Role::Pro if !self.is_active(now) => Role::Free,
            role => role,
        }
    }

    /// Computes the entitlement after a verified purchase of `plan`.
    ///
    /// Upgrades are monotonic: an active lifetime user stays lifetime, and a
    /// pro end date never moves backwards.
    pub fn apply_plan(&self, plan: &Plan, now: Timestamp, policy: RenewalPolicy) -> EntitlementChange {
        let current = self.effective_role(now);
        if current.rank() > plan.role.rank() {
            return EntitlementChange::Unchanged;
        }

        match plan.duration {
            PlanDuration::Lifetime => {
                if current == Role::Max {
                    return EntitlementChange::Unchanged;
                }
                EntitlementChange::Upgraded(Self {
                    user_id: self.user_id.clone(),
                    role: plan.role,
                    subscription_type: plan.subscription_type,
                    subscription_end_date: None,
                    last_payment_id: self.last_payment_id.clone(),
                })
            }
            PlanDuration::Days(days) => {
                let active_end = self
                    .subscription_end_date
                    .filter(|_| current == plan.role)
                    .filter(|end| end.is_after(&now));

                let new_end = match (policy, active_end) {
                    (RenewalPolicy::ExtendRemaining, Some(end)) => end.add_days(days),
                    (RenewalPolicy::ResetFromNow, Some(end)) => end.max(now.add_days(days)),
                    (_, None) => now.add_days(days),
                };

                EntitlementChange::Upgraded(Self {
                    user_id: self.user_id.clone(),
                    role: plan.role,
                    subscription_type: plan.subscription_type,
                    subscription_end_date: Some(new_end),
                    last_payment_id: self.last_payment_id.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::plan::{MAX_LIFETIME, PRO_MONTHLY};

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    fn pro_until(end: Timestamp) -> Entitlement {
        Entitlement::from_parts(user(), Role::Pro, SubscriptionType::ProMonthly, Some(end)).unwrap()
    }

    fn max() -> Entitlement {
        Entitlement::from_parts(user(), Role::Max, SubscriptionType::MaxLifetime, None).unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Invariants
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn max_with_end_date_is_rejected() {
        let result = Entitlement::from_parts(
            user(),
            Role::Max,
            SubscriptionType::MaxLifetime,
            Some(now()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn pro_without_end_date_is_rejected() {
        let result = Entitlement::from_parts(user(), Role::Pro, SubscriptionType::ProMonthly, None);
        assert!(result.is_err());
    }

    #[test]
    fn mismatched_role_and_type_is_rejected() {
        let result = Entitlement::from_parts(user(), Role::Pro, SubscriptionType::MaxLifetime, None);
        assert!(result.is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Derived expiry
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn expired_pro_reads_as_free() {
        let entitlement = pro_until(now().add_days(-1));
        assert_eq!(entitlement.role, Role::Pro);
        assert_eq!(entitlement.effective_role(now()), Role::Free);
    }

    #[test]
    fn active_pro_reads_as_pro() {
        let entitlement = pro_until(now().add_days(3));
        assert_eq!(entitlement.effective_role(now()), Role::Pro);
    }

    #[test]
    fn lifetime_never_expires() {
        assert!(max().is_active(now().add_days(10_000)));
    }

    // ══════════════════════════════════════════════════════════════
    // Applying plans
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn free_user_buying_pro_gets_thirty_days() {
        let change = Entitlement::free(user()).apply_plan(&PRO_MONTHLY, now(), RenewalPolicy::default());

        let EntitlementChange::Upgraded(new) = change else {
            panic!("expected upgrade");
        };
        assert_eq!(new.role, Role::Pro);
        assert_eq!(new.subscription_type, SubscriptionType::ProMonthly);
        assert_eq!(new.subscription_end_date, Some(now().add_days(30)));
    }

    #[test]
    fn free_user_buying_max_gets_lifetime() {
        let change = Entitlement::free(user()).apply_plan(&MAX_LIFETIME, now(), RenewalPolicy::default());

        assert_eq!(change, EntitlementChange::Upgraded(max()));
    }

    #[test]
    fn max_user_buying_pro_is_unchanged() {
        let change = max().apply_plan(&PRO_MONTHLY, now(), RenewalPolicy::default());
        assert_eq!(change, EntitlementChange::Unchanged);
    }

    #[test]
    fn max_user_buying_max_again_is_unchanged() {
        let change = max().apply_plan(&MAX_LIFETIME, now(), RenewalPolicy::ExtendRemaining);
        assert_eq!(change, EntitlementChange::Unchanged);
    }

    #[test]
    fn pro_user_buying_max_drops_end_date() {
        let change = pro_until(now().add_days(12)).apply_plan(&MAX_LIFETIME, now(), RenewalPolicy::default());
        assert_eq!(change, EntitlementChange::Upgraded(max()));
    }

    #[test]
    fn reset_policy_discards_remaining_days() {
        let change = pro_until(now().add_days(10)).apply_plan(&PRO_MONTHLY, now(), RenewalPolicy::ResetFromNow);

        let EntitlementChange::Upgraded(new) = change else {
            panic!("expected upgrade");
        };
        assert_eq!(new.subscription_end_date, Some(now().add_days(30)));
    }

    #[test]
    fn reset_policy_never_shortens_a_longer_window() {
        let change = pro_until(now().add_days(45)).apply_plan(&PRO_MONTHLY, now(), RenewalPolicy::ResetFromNow);

        let EntitlementChange::Upgraded(new) = change else {
            panic!("expected upgrade");
        };
        assert_eq!(new.subscription_end_date, Some(now().add_days(45)));
    }

    #[test]
    fn extend_policy_stacks_on_remaining_days() {
        let change = pro_until(now().add_days(10)).apply_plan(&PRO_MONTHLY, now(), RenewalPolicy::ExtendRemaining);

        let EntitlementChange::Upgraded(new) = change else {
            panic!("expected upgrade");
        };
        assert_eq!(new.subscription_end_date, Some(now().add_days(40)));
    }

    #[test]
    fn extend_policy_ignores_expired_window() {
        let change = pro_until(now().add_days(-5)).apply_plan(&PRO_MONTHLY, now(), RenewalPolicy::ExtendRemaining);

        let EntitlementChange::Upgraded(new) = change else {
            panic!("expected upgrade");
        };
        assert_eq!(new.subscription_end_date, Some(now().add_days(30)));
    }

    #[test]
    fn payment_tag_identifies_crediting_payment() {
        let payment_id = PaymentId::new("pay_1").unwrap();
        let tagged = max().with_last_payment(payment_id.clone());

        assert!(tagged.was_credited_by(&payment_id));
        assert!(!tagged.was_credited_by(&PaymentId::new("pay_2").unwrap()));
        assert!(!max().was_credited_by(&payment_id));
    }

    #[test]
    fn upgrade_keeps_previous_payment_tag_until_retagged() {
        let payment_id = PaymentId::new("pay_1").unwrap();
        let change = Entitlement::free(user())
            .with_last_payment(payment_id.clone())
            .apply_plan(&PRO_MONTHLY, now(), RenewalPolicy::default());

        let EntitlementChange::Upgraded(new) = change else {
            panic!("expected upgrade");
        };
        assert_eq!(new.last_payment_id, Some(payment_id));
    }

    #[test]
    fn renewal_policy_deserializes_from_config_value() {
        let policy: RenewalPolicy = serde_json::from_str("\"extend_remaining\"").unwrap();
        assert_eq!(policy, RenewalPolicy::ExtendRemaining);
    }
}
