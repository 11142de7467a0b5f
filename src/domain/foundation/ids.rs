//! Strongly-typed identifier value objects.
//!
//! Gateway identifiers are opaque strings assigned by the payment provider,
//! so none of these wrap a UUID. They only guarantee non-emptiness.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier, returning error if empty or blank.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::empty_field($field));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Returns the inner string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// Identifier of an account owner in the auth provider.
    UserId,
    "user_id"
);

opaque_id!(
    /// Gateway-assigned order identifier (e.g. `order_Nx3...`).
    OrderId,
    "order_id"
);

opaque_id!(
    /// Gateway-assigned payment identifier, unique per completed transaction.
    PaymentId,
    "payment_id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_empty() {
        assert!(UserId::new("").is_err());
    }

    #[test]
    fn payment_id_rejects_blank() {
        let err = PaymentId::new("   ").unwrap_err();
        assert_eq!(format!("{}", err), "Field 'payment_id' cannot be empty");
    }

    #[test]
    fn order_id_trims_whitespace() {
        let id = OrderId::new("  order_123 ").unwrap();
        assert_eq!(id.as_str(), "order_123");
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = PaymentId::new("pay_abc").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"pay_abc\"");
    }
}
