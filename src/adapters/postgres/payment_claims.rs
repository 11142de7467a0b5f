//! PostgreSQL implementation of PaymentClaimStore.
//!
//! ## Race Condition Handling
//!
//! `try_claim` is one `INSERT ... ON CONFLICT DO UPDATE ... WHERE` statement:
//! - No row: inserted, caller owns the claim
//! - Stale `in_flight` row: overwritten, caller owns the claim
//! - Anything else: untouched, `RETURNING` yields nothing and the caller
//!   reads back who holds it
//!
//! Status changes are compare-and-set on the previous status.
//!
//! `find_unsettled` also returns abandoned `in_flight` rows; the reconciler
//! must still win `try_claim` on them before crediting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::billing::{ClaimOutcome, ClaimStatus, LedgerEntry, PaymentClaim};
use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, StateMachine, Timestamp, UserId,
};
use crate::ports::PaymentClaimStore;

pub struct PostgresPaymentClaimStore {
    pool: PgPool,
}

impl PostgresPaymentClaimStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, payment_id: &PaymentId) -> Result<ClaimStatus, DomainError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM payment_claims WHERE payment_id = $1")
                .bind(payment_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to read claim status", e))?;

        match status {
            Some(status) => parse_status(&status),
            None => Err(DomainError::new(
                ErrorCode::NotFound,
                format!("No claim for payment {}", payment_id),
            )),
        }
    }

    async fn transition(
        &self,
        payment_id: &PaymentId,
        target: ClaimStatus,
        error: Option<&str>,
    ) -> Result<(), DomainError> {
        let current = self.current_status(payment_id).await?;
        if current != target {
            current.transition_to(target).map_err(|e| {
                DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
            })?;
        }

        let result = sqlx::query(
            r#"
            UPDATE payment_claims SET
                status = $2,
                updated_at = NOW(),
                attempts = attempts + CASE WHEN $4::TEXT IS NULL THEN 0 ELSE 1 END,
                last_error = COALESCE($4, last_error)
            WHERE payment_id = $1 AND status = $3
            "#,
        )
        .bind(payment_id.as_str())
        .bind(target.as_str())
        .bind(current.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update claim", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::Conflict,
                format!("Claim for payment {} changed concurrently", payment_id),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ClaimRow {
    payment_id: String,
    user_id: String,
    status: String,
    entry: Json<LedgerEntry>,
    claimed_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    attempts: i32,
    last_error: Option<String>,
}

impl TryFrom<ClaimRow> for PaymentClaim {
    type Error = DomainError;

    fn try_from(row: ClaimRow) -> Result<Self, Self::Error> {
        Ok(PaymentClaim {
            payment_id: PaymentId::new(row.payment_id)
                .map_err(|e| DomainError::new(ErrorCode::DatabaseError, e.to_string()))?,
            user_id: UserId::new(row.user_id)
                .map_err(|e| DomainError::new(ErrorCode::DatabaseError, e.to_string()))?,
            status: parse_status(&row.status)?,
            entry: row.entry.0,
            claimed_at: Timestamp::from_datetime(row.claimed_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_error: row.last_error,
        })
    }
}

fn parse_status(s: &str) -> Result<ClaimStatus, DomainError> {
    s.parse::<ClaimStatus>().map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid claim status value: {}", e),
        )
    })
}

fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

#[async_trait]
impl PaymentClaimStore for PostgresPaymentClaimStore {
    async fn try_claim(
        &self,
        claim: &PaymentClaim,
        stale_before: Timestamp,
    ) -> Result<ClaimOutcome, DomainError> {
        let inserted: Option<bool> = sqlx::query_scalar(
            r#"
            INSERT INTO payment_claims (
                payment_id, user_id, status, entry, claimed_at, updated_at, attempts, last_error
            )
            VALUES ($1, $2, $3, $4, $5, $5, 0, NULL)
            ON CONFLICT (payment_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                entry = EXCLUDED.entry,
                claimed_at = EXCLUDED.claimed_at,
                updated_at = EXCLUDED.updated_at,
                attempts = payment_claims.attempts + 1
            WHERE payment_claims.status = 'in_flight'
              AND payment_claims.updated_at < $6
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(claim.payment_id.as_str())
        .bind(claim.user_id.as_str())
        .bind(ClaimStatus::InFlight.as_str())
        .bind(Json(&claim.entry))
        .bind(claim.claimed_at.as_datetime())
        .bind(stale_before.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to claim payment", e))?;

        match inserted {
            Some(true) => Ok(ClaimOutcome::Acquired),
            Some(false) => Ok(ClaimOutcome::TakenOver),
            None => match self.current_status(&claim.payment_id).await {
                Ok(status) => Ok(ClaimOutcome::Held(status)),
                // Released between our insert and the read; report as busy.
                Err(e) if e.code == ErrorCode::NotFound => {
                    Ok(ClaimOutcome::Held(ClaimStatus::InFlight))
                }
                Err(e) => Err(e),
            },
        }
    }

    async fn find(&self, payment_id: &PaymentId) -> Result<Option<PaymentClaim>, DomainError> {
        let row: Option<ClaimRow> = sqlx::query_as(
            r#"
            SELECT payment_id, user_id, status, entry, claimed_at, updated_at, attempts, last_error
            FROM payment_claims
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch claim", e))?;

        row.map(PaymentClaim::try_from).transpose()
    }

    async fn mark_credited(&self, payment_id: &PaymentId) -> Result<(), DomainError> {
        self.transition(payment_id, ClaimStatus::Credited, None).await
    }

    async fn mark_credit_pending(
        &self,
        payment_id: &PaymentId,
        error: &str,
    ) -> Result<(), DomainError> {
        self.transition(payment_id, ClaimStatus::CreditPending, Some(error))
            .await
    }

    async fn mark_recorded(&self, payment_id: &PaymentId) -> Result<(), DomainError> {
        self.transition(payment_id, ClaimStatus::Recorded, None).await
    }

    async fn release(&self, payment_id: &PaymentId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM payment_claims WHERE payment_id = $1 AND status = 'in_flight'")
            .bind(payment_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to release claim", e))?;
        Ok(())
    }

    async fn find_unsettled(
        &self,
        limit: usize,
        stale_before: Timestamp,
    ) -> Result<Vec<PaymentClaim>, DomainError> {
        let rows: Vec<ClaimRow> = sqlx::query_as(
            r#"
            SELECT payment_id, user_id, status, entry, claimed_at, updated_at, attempts, last_error
            FROM payment_claims
            WHERE status IN ('credit_pending', 'credited')
               OR (status = 'in_flight' AND updated_at < $2)
            ORDER BY claimed_at ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(stale_before.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list unsettled claims", e))?;

        rows.into_iter().map(PaymentClaim::try_from).collect()
    }

    async fn record_failure(
        &self,
        payment_id: &PaymentId,
        status: ClaimStatus,
        error: &str,
    ) -> Result<(), DomainError> {
        self.transition(payment_id, status, Some(error)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_status_strings_parse() {
        assert_eq!(parse_status("credit_pending").unwrap(), ClaimStatus::CreditPending);
        assert_eq!(
            parse_status("settled").unwrap_err().code,
            ErrorCode::DatabaseError
        );
    }
}
