//! Entitlement store port.
//!
//! Reads and writes the entitlement fields on a user's profile. Each write
//! replaces the three fields of one row atomically.

use async_trait::async_trait;

use crate::domain::billing::Entitlement;
use crate::domain::foundation::{DomainError, UserId};

/// Port for entitlement persistence.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Current entitlement for `user_id`.
    ///
    /// A user without a profile row reads as a fresh free entitlement.
    async fn get_entitlement(&self, user_id: &UserId) -> Result<Entitlement, DomainError>;

    /// Persist `entitlement` as a single-row upsert.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn update_entitlement(&self, entitlement: &Entitlement) -> Result<(), DomainError>;
}
