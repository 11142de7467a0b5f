//! Role and subscription type enumerations stored on the user profile.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Access role granted to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Default role at signup.
    Free,
    /// Paid monthly tier.
    Pro,
    /// Lifetime tier.
    Max,
}

impl Role {
    /// Numeric rank used to keep upgrades monotonic.
    pub fn rank(&self) -> u8 {
        match self {
            Role::Free => 0,
            Role::Pro => 1,
            Role::Max => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Free => "free",
            Role::Pro => "pro",
            Role::Max => "max",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Role::Free),
            "pro" => Ok(Role::Pro),
            "max" => Ok(Role::Max),
            other => Err(ValidationError::invalid_format(
                "role",
                format!("unknown value '{}'", other),
            )),
        }
    }
}

/// Billing arrangement behind a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    Free,
    ProMonthly,
    MaxLifetime,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Free => "free",
            SubscriptionType::ProMonthly => "pro_monthly",
            SubscriptionType::MaxLifetime => "max_lifetime",
        }
    }

    /// The only role this subscription type may be paired with.
    pub fn role(&self) -> Role {
        match self {
            SubscriptionType::Free => Role::Free,
            SubscriptionType::ProMonthly => Role::Pro,
            SubscriptionType::MaxLifetime => Role::Max,
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(SubscriptionType::Free),
            "pro_monthly" => Ok(SubscriptionType::ProMonthly),
            "max_lifetime" => Ok(SubscriptionType::MaxLifetime),
            other => Err(ValidationError::invalid_format(
                "subscription_type",
                format!("unknown value '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ranks_are_ordered() {
        assert!(Role::Free.rank() < Role::Pro.rank());
        assert!(Role::Pro.rank() < Role::Max.rank());
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("PRO".parse::<Role>().unwrap(), Role::Pro);
        assert!("gold".parse::<Role>().is_err());
    }

    #[test]
    fn subscription_type_serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionType::MaxLifetime).unwrap();
        assert_eq!(json, "\"max_lifetime\"");
    }

    #[test]
    fn subscription_type_maps_to_single_role() {
        assert_eq!(SubscriptionType::ProMonthly.role(), Role::Pro);
        assert_eq!(SubscriptionType::MaxLifetime.role(), Role::Max);
        assert_eq!(SubscriptionType::Free.role(), Role::Free);
    }
}
