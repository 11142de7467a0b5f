//! GetEntitlementHandler - Query handler for a user's current tier.

use std::sync::Arc;

use crate::domain::billing::{Entitlement, Role};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::EntitlementStore;

/// Query to get a user's entitlement.
#[derive(Debug, Clone)]
pub struct GetEntitlementQuery {
    pub user_id: UserId,
}

/// Stored entitlement plus the role it grants right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementView {
    pub entitlement: Entitlement,
    /// Falls back to free once a monthly plan has lapsed.
    pub effective_role: Role,
}

pub struct GetEntitlementHandler {
    store: Arc<dyn EntitlementStore>,
}

impl GetEntitlementHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, query: GetEntitlementQuery) -> Result<EntitlementView, DomainError> {
        let entitlement = self.store.get_entitlement(&query.user_id).await?;
        let effective_role = entitlement.effective_role(Timestamp::now());
        Ok(EntitlementView {
            entitlement,
            effective_role,
        })
    }
}
