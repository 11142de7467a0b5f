//! ListPaymentsHandler - Query handler for a user's credited payments.

use std::sync::Arc;

use crate::domain::billing::LedgerEntry;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::PaymentLedger;

/// Query to list a user's ledger entries.
#[derive(Debug, Clone)]
pub struct ListPaymentsQuery {
    pub user_id: UserId,
}

pub struct ListPaymentsHandler {
    ledger: Arc<dyn PaymentLedger>,
}

impl ListPaymentsHandler {
    pub fn new(ledger: Arc<dyn PaymentLedger>) -> Self {
        Self { ledger }
    }

    /// Newest first.
    pub async fn handle(&self, query: ListPaymentsQuery) -> Result<Vec<LedgerEntry>, DomainError> {
        self.ledger.list_for_user(&query.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPaymentLedger;
    use crate::domain::billing::{GatewayStatus, PlanKind, SubscriptionType};
    use crate::domain::foundation::{OrderId, PaymentId, Timestamp};

    fn entry(user: &str, payment: &str, recorded_at: Timestamp) -> LedgerEntry {
        LedgerEntry {
            payment_id: PaymentId::new(payment).unwrap(),
            order_id: OrderId::new(format!("order_{}", payment)).unwrap(),
            user_id: UserId::new(user).unwrap(),
            amount_minor: 14_900,
            currency: "INR".to_string(),
            status: GatewayStatus::Captured,
            plan: PlanKind::Pro,
            subscription_type: SubscriptionType::ProMonthly,
            recorded_at,
        }
    }

    #[tokio::test]
    async fn lists_only_the_callers_payments_newest_first() {
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let now = Timestamp::now();
        ledger.append(&entry("user-1", "pay_old", now.add_days(-40))).await.unwrap();
        ledger.append(&entry("user-2", "pay_other", now)).await.unwrap();
        ledger.append(&entry("user-1", "pay_new", now)).await.unwrap();
        let handler = ListPaymentsHandler::new(ledger);

        let payments = handler
            .handle(ListPaymentsQuery {
                user_id: UserId::new("user-1").unwrap(),
            })
            .await
            .unwrap();

        let ids: Vec<_> = payments.iter().map(|p| p.payment_id.as_str()).collect();
        assert_eq!(ids, vec!["pay_new", "pay_old"]);
    }

    #[tokio::test]
    async fn user_without_payments_gets_empty_list() {
        let handler = ListPaymentsHandler::new(Arc::new(InMemoryPaymentLedger::new()));

        let payments = handler
            .handle(ListPaymentsQuery {
                user_id: UserId::new("user-1").unwrap(),
            })
            .await
            .unwrap();

        assert!(payments.is_empty());
    }
}
