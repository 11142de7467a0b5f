//! PostgreSQL implementation of EntitlementStore.
//!
//! Entitlements live on the `profiles` table. Writes are a single-row upsert,
//! so a user's entitlement fields and the payment that set them always
//! change together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{Entitlement, Role, SubscriptionType};
use crate::domain::foundation::{DomainError, ErrorCode, PaymentId, Timestamp, UserId};
use crate::ports::EntitlementStore;

pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of the entitlement columns.
#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    id: String,
    role: String,
    subscription_type: String,
    subscription_end_date: Option<DateTime<Utc>>,
    last_payment_id: Option<String>,
}

impl TryFrom<EntitlementRow> for Entitlement {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let user_id = UserId::new(row.id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid profile id: {}", e))
        })?;
        let role: Role = row.role.parse().map_err(corrupt_row)?;
        let subscription_type: SubscriptionType =
            row.subscription_type.parse().map_err(corrupt_row)?;

        let mut entitlement = Entitlement::from_parts(
            user_id,
            role,
            subscription_type,
            row.subscription_end_date.map(Timestamp::from_datetime),
        )
        .map_err(corrupt_row)?;
        entitlement.last_payment_id = row
            .last_payment_id
            .map(PaymentId::new)
            .transpose()
            .map_err(corrupt_row)?;
        Ok(entitlement)
    }
}

fn corrupt_row(err: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid entitlement row: {}", err),
    )
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn get_entitlement(&self, user_id: &UserId) -> Result<Entitlement, DomainError> {
        let row: Option<EntitlementRow> = sqlx::query_as(
            r#"
            SELECT id, role, subscription_type, subscription_end_date, last_payment_id
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to fetch entitlement: {}", e),
            )
        })?;

        match row {
            Some(row) => row.try_into(),
            None => Ok(Entitlement::free(user_id.clone())),
        }
    }

    async fn update_entitlement(&self, entitlement: &Entitlement) -> Result<(), DomainError> {
        entitlement.check_invariants()?;

        sqlx::query(
            r#"
            INSERT INTO profiles (
                id, role, subscription_type, subscription_end_date, last_payment_id, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id) DO UPDATE SET
                role = EXCLUDED.role,
                subscription_type = EXCLUDED.subscription_type,
                subscription_end_date = EXCLUDED.subscription_end_date,
                last_payment_id = EXCLUDED.last_payment_id,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(entitlement.user_id.as_str())
        .bind(entitlement.role.as_str())
        .bind(entitlement.subscription_type.as_str())
        .bind(entitlement.subscription_end_date.map(|t| *t.as_datetime()))
        .bind(entitlement.last_payment_id.as_ref().map(|p| p.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to update entitlement: {}", e),
            )
        })?;

        Ok(())
    }
}
