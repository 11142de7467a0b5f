//! PostgreSQL implementation of PaymentLedger.
//!
//! The primary key on `payment_id` decides which append wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{GatewayStatus, LedgerEntry, PlanKind, SubscriptionType};
use crate::domain::foundation::{DomainError, ErrorCode, OrderId, PaymentId, Timestamp, UserId};
use crate::ports::{AppendOutcome, PaymentLedger};

pub struct PostgresPaymentLedger {
    pool: PgPool,
}

impl PostgresPaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    payment_id: String,
    order_id: String,
    user_id: String,
    amount_minor: i64,
    currency: String,
    status: String,
    plan: String,
    subscription_type: String,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DomainError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            payment_id: PaymentId::new(row.payment_id).map_err(invalid_row)?,
            order_id: OrderId::new(row.order_id).map_err(invalid_row)?,
            user_id: UserId::new(row.user_id).map_err(invalid_row)?,
            amount_minor: row.amount_minor,
            currency: row.currency,
            status: GatewayStatus::parse(&row.status),
            plan: row.plan.parse::<PlanKind>().map_err(invalid_row)?,
            subscription_type: row
                .subscription_type
                .parse::<SubscriptionType>()
                .map_err(invalid_row)?,
            recorded_at: Timestamp::from_datetime(row.recorded_at),
        })
    }
}

fn invalid_row(err: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Invalid ledger row: {}", err))
}

#[async_trait]
impl PaymentLedger for PostgresPaymentLedger {
    async fn has(&self, payment_id: &PaymentId) -> Result<bool, DomainError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM payment_ledger WHERE payment_id = $1)",
        )
        .bind(payment_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to check ledger: {}", e),
            )
        })?;

        Ok(exists)
    }

    async fn append(&self, entry: &LedgerEntry) -> Result<AppendOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_ledger (
                payment_id, order_id, user_id, amount_minor, currency,
                status, plan, subscription_type, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(entry.payment_id.as_str())
        .bind(entry.order_id.as_str())
        .bind(entry.user_id.as_str())
        .bind(entry.amount_minor)
        .bind(&entry.currency)
        .bind(entry.status.as_str())
        .bind(entry.plan.as_str())
        .bind(entry.subscription_type.as_str())
        .bind(entry.recorded_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to append ledger entry: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            Ok(AppendOutcome::AlreadyExists)
        } else {
            Ok(AppendOutcome::Inserted)
        }
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, DomainError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(
            r#"
            SELECT payment_id, order_id, user_id, amount_minor, currency,
                   status, plan, subscription_type, recorded_at
            FROM payment_ledger
            WHERE user_id = $1
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to list ledger entries: {}", e),
            )
        })?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }
}
