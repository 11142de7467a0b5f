//! Plan catalog and plan resolution.
//!
//! The catalog is the single source of truth for what can be bought and at
//! which price. Order issuance reads prices from it and verification maps
//! gateway-reported amounts back through it, so the two sides can never
//! disagree about a price. Bump `version` whenever an entry changes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::tier::{Role, SubscriptionType};
use crate::domain::foundation::ValidationError;

/// Plan a customer can ask to buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    Pro,
    Max,
}

impl PlanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanKind::Pro => "pro",
            PlanKind::Max => "max",
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pro" => Ok(PlanKind::Pro),
            "max" => Ok(PlanKind::Max),
            other => Err(ValidationError::invalid_format(
                "plan",
                format!("unknown plan '{}'", other),
            )),
        }
    }
}

/// How long a purchased plan grants access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDuration {
    Days(i64),
    Lifetime,
}

/// A purchasable plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub kind: PlanKind,
    /// Price in minor currency units (paise).
    pub amount_minor: i64,
    pub role: Role,
    pub subscription_type: SubscriptionType,
    pub duration: PlanDuration,
}

pub const PRO_MONTHLY: Plan = Plan {
    kind: PlanKind::Pro,
    amount_minor: 14_900,
    role: Role::Pro,
    subscription_type: SubscriptionType::ProMonthly,
    duration: PlanDuration::Days(30),
};

pub const MAX_LIFETIME: Plan = Plan {
    kind: PlanKind::Max,
    amount_minor: 149_900,
    role: Role::Max,
    subscription_type: SubscriptionType::MaxLifetime,
    duration: PlanDuration::Lifetime,
};

/// Versioned price table shared by order issuance and verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanCatalog {
    pub version: &'static str,
    /// ISO 4217 code every price in the table is expressed in.
    pub currency: &'static str,
    plans: &'static [Plan],
}

impl PlanCatalog {
    pub const CURRENT: PlanCatalog = PlanCatalog {
        version: "2024-01",
        currency: "INR",
        plans: &[PRO_MONTHLY, MAX_LIFETIME],
    };

    /// Builds a catalog from an explicit table.
    pub const fn new(
        version: &'static str,
        currency: &'static str,
        plans: &'static [Plan],
    ) -> Self {
        Self {
            version,
            currency,
            plans,
        }
    }

    pub fn plans(&self) -> &'static [Plan] {
        self.plans
    }

    /// Maps a charged amount back to the plan that costs exactly that much.
    ///
    /// Never guesses: any amount not in the table yields `None`.
    pub fn resolve(&self, amount_minor: i64) -> Option<Plan> {
        self.plans
            .iter()
            .find(|plan| plan.amount_minor == amount_minor)
            .copied()
    }

    /// Looks up the catalog entry for a requested plan.
    pub fn plan_for(&self, kind: PlanKind) -> Option<Plan> {
        self.plans.iter().find(|plan| plan.kind == kind).copied()
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Resolves an amount against the current catalog.
pub fn resolve_plan(amount_minor: i64) -> Option<Plan> {
    PlanCatalog::CURRENT.resolve(amount_minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pro_price_resolves_to_pro_monthly() {
        let plan = resolve_plan(14_900).unwrap();
        assert_eq!(plan.subscription_type, SubscriptionType::ProMonthly);
        assert_eq!(plan.role, Role::Pro);
        assert_eq!(plan.duration, PlanDuration::Days(30));
    }

    #[test]
    fn max_price_resolves_to_lifetime() {
        let plan = resolve_plan(149_900).unwrap();
        assert_eq!(plan.subscription_type, SubscriptionType::MaxLifetime);
        assert_eq!(plan.duration, PlanDuration::Lifetime);
    }

    #[test]
    fn unknown_amounts_do_not_resolve() {
        assert!(resolve_plan(1).is_none());
        assert!(resolve_plan(0).is_none());
        assert!(resolve_plan(-14_900).is_none());
        assert!(resolve_plan(14_901).is_none());
    }

    #[test]
    fn every_catalog_entry_round_trips_through_its_price() {
        let catalog = PlanCatalog::CURRENT;
        for plan in catalog.plans() {
            assert_eq!(catalog.plan_for(plan.kind), Some(*plan));
            assert_eq!(catalog.resolve(plan.amount_minor), Some(*plan));
        }
    }

    #[test]
    fn plan_roles_match_subscription_types() {
        for plan in PlanCatalog::CURRENT.plans() {
            assert_eq!(plan.subscription_type.role(), plan.role);
        }
    }

    #[test]
    fn custom_catalog_without_max_has_no_max_plan() {
        static ONLY_PRO: [Plan; 1] = [PRO_MONTHLY];
        let catalog = PlanCatalog::new("test", "INR", &ONLY_PRO);
        assert!(catalog.plan_for(PlanKind::Max).is_none());
        assert!(catalog.resolve(149_900).is_none());
    }

    #[test]
    fn plan_kind_parses_request_values() {
        assert_eq!("pro".parse::<PlanKind>().unwrap(), PlanKind::Pro);
        assert_eq!("Max".parse::<PlanKind>().unwrap(), PlanKind::Max);
        assert!("enterprise".parse::<PlanKind>().is_err());
    }
}
