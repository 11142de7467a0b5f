//! In-memory payment gateway for tests and local development.
//!
//! Supports:
//! - Order issuance with sequential ids
//! - Simulated checkout completion
//! - Error injection and artificial latency on `fetch_payment`
//! - Call counting

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{GatewayPayment, GatewayStatus, PaymentOrder, PlanKind};
use crate::domain::foundation::{OrderId, PaymentId, Timestamp, UserId};
use crate::ports::{GatewayError, PaymentGateway};

/// Gateway fake backed by hash maps.
pub struct InMemoryGateway {
    key_id: String,
    orders: RwLock<HashMap<OrderId, PaymentOrder>>,
    payments: RwLock<HashMap<PaymentId, GatewayPayment>>,
    fetch_error: RwLock<Option<GatewayError>>,
    fetch_delay: RwLock<Option<Duration>>,
    next_order: AtomicU32,
    fetch_calls: AtomicU32,
}

impl InMemoryGateway {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            orders: RwLock::new(HashMap::new()),
            payments: RwLock::new(HashMap::new()),
            fetch_error: RwLock::new(None),
            fetch_delay: RwLock::new(None),
            next_order: AtomicU32::new(1),
            fetch_calls: AtomicU32::new(0),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Simulation
    // ════════════════════════════════════════════════════════════════════════════

    /// Store a payment exactly as the gateway would report it.
    pub async fn insert_payment(&self, payment: GatewayPayment) {
        self.payments
            .write()
            .await
            .insert(payment.payment_id.clone(), payment);
    }

    /// Simulate the customer paying `order_id` in full at checkout.
    ///
    /// Returns `None` if the order was never issued here.
    pub async fn complete_checkout(
        &self,
        order_id: &OrderId,
        payment_id: &PaymentId,
        status: GatewayStatus,
    ) -> Option<GatewayPayment> {
        let order = self.orders.read().await.get(order_id).cloned()?;
        let payment = GatewayPayment {
            payment_id: payment_id.clone(),
            order_id: Some(order.order_id.clone()),
            status,
            amount_minor: order.amount_minor,
            currency: order.currency.clone(),
            notes_user_id: Some(order.user_id.to_string()),
        };
        self.insert_payment(payment.clone()).await;
        Some(payment)
    }

    /// Make every `fetch_payment` fail with `error` until cleared.
    pub async fn fail_fetches(&self, error: Option<GatewayError>) {
        *self.fetch_error.write().await = error;
    }

    /// Delay every `fetch_payment` by `delay`.
    pub async fn delay_fetches(&self, delay: Option<Duration>) {
        *self.fetch_delay.write().await = delay;
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn fetch_count(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub async fn order(&self, order_id: &OrderId) -> Option<PaymentOrder> {
        self.orders.read().await.get(order_id).cloned()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        plan: PlanKind,
        user_id: &UserId,
    ) -> Result<PaymentOrder, GatewayError> {
        let n = self.next_order.fetch_add(1, Ordering::SeqCst);
        let order_id = OrderId::new(format!("order_test_{:06}", n))
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let order = PaymentOrder {
            order_id: order_id.clone(),
            amount_minor,
            currency: currency.to_string(),
            plan,
            user_id: user_id.clone(),
            created_at: Timestamp::now(),
        };
        self.orders.write().await.insert(order_id, order.clone());
        Ok(order)
    }

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<GatewayPayment, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.fetch_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fetch_error.read().await.clone() {
            return Err(err);
        }

        self.payments
            .read()
            .await
            .get(payment_id)
            .cloned()
            .ok_or_else(|| {
                GatewayError::from_status(404, format!("payment {} does not exist", payment_id))
            })
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_orders_can_be_paid() {
        let gateway = InMemoryGateway::new("rzp_test");
        let user = UserId::new("user-1").unwrap();
        let order = gateway
            .create_order(14_900, "INR", PlanKind::Pro, &user)
            .await
            .unwrap();

        let payment_id = PaymentId::new("pay_1").unwrap();
        gateway
            .complete_checkout(&order.order_id, &payment_id, GatewayStatus::Captured)
            .await
            .unwrap();

        let fetched = gateway.fetch_payment(&payment_id).await.unwrap();
        assert_eq!(fetched.amount_minor, 14_900);
        assert_eq!(fetched.order_id, Some(order.order_id));
        assert_eq!(fetched.notes_user_id.as_deref(), Some("user-1"));
        assert_eq!(gateway.fetch_count(), 1);
    }

    #[tokio::test]
    async fn unknown_payment_is_rejected() {
        let gateway = InMemoryGateway::new("rzp_test");
        let err = gateway
            .fetch_payment(&PaymentId::new("pay_missing").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn injected_error_is_returned() {
        let gateway = InMemoryGateway::new("rzp_test");
        gateway
            .fail_fetches(Some(GatewayError::Network("connection refused".into())))
            .await;
        let err = gateway
            .fetch_payment(&PaymentId::new("pay_1").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
