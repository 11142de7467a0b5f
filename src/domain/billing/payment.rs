//! Orders, gateway-reported payments and ledger entries.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::plan::{Plan, PlanKind};
use super::tier::SubscriptionType;
use crate::domain::foundation::{OrderId, PaymentId, Timestamp, UserId};

/// Payment status as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
    /// Any status string this service does not know about.
    #[serde(untagged)]
    Other(String),
}

impl GatewayStatus {
    /// Parses the gateway's status string. Unknown values are kept verbatim.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "created" => GatewayStatus::Created,
            "authorized" => GatewayStatus::Authorized,
            "captured" => GatewayStatus::Captured,
            "refunded" => GatewayStatus::Refunded,
            "failed" => GatewayStatus::Failed,
            other => GatewayStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GatewayStatus::Created => "created",
            GatewayStatus::Authorized => "authorized",
            GatewayStatus::Captured => "captured",
            GatewayStatus::Refunded => "refunded",
            GatewayStatus::Failed => "failed",
            GatewayStatus::Other(raw) => raw,
        }
    }

    /// Only captured or authorized payments may grant an entitlement.
    pub fn is_successful(&self) -> bool {
        matches!(self, GatewayStatus::Captured | GatewayStatus::Authorized)
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order issued through the gateway before checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub order_id: OrderId,
    /// Minor currency units, always taken from the plan catalog.
    pub amount_minor: i64,
    pub currency: String,
    pub plan: PlanKind,
    pub user_id: UserId,
    pub created_at: Timestamp,
}

/// Payment details fetched from the gateway by payment id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub payment_id: PaymentId,
    pub order_id: Option<OrderId>,
    pub status: GatewayStatus,
    pub amount_minor: i64,
    pub currency: String,
    /// Owner recorded in the order notes when the order was issued.
    pub notes_user_id: Option<String>,
}

/// A payment whose signature checked out and whose gateway status is successful.
///
/// Only [`VerifiedPayment::new`] builds one, so holding a value is proof that
/// both checks passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    order_id: OrderId,
    payment_id: PaymentId,
    status: GatewayStatus,
    amount_minor: i64,
    currency: String,
    verified_at: Timestamp,
}

/// The gateway reported a status that does not grant anything.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("payment status '{status}' is not successful")]
pub struct UnsuccessfulPayment {
    pub status: GatewayStatus,
}

impl VerifiedPayment {
    /// Builds a verified payment from a signature-checked order/payment pair and
    /// the gateway's view of it.
    pub fn new(
        order_id: OrderId,
        payment: GatewayPayment,
        verified_at: Timestamp,
    ) -> Result<Self, UnsuccessfulPayment> {
        if !payment.status.is_successful() {
            return Err(UnsuccessfulPayment {
                status: payment.status,
            });
        }
        Ok(Self {
            order_id,
            payment_id: payment.payment_id,
            status: payment.status,
            amount_minor: payment.amount_minor,
            currency: payment.currency,
            verified_at,
        })
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn payment_id(&self) -> &PaymentId {
        &self.payment_id
    }

    pub fn status(&self) -> &GatewayStatus {
        &self.status
    }

    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn verified_at(&self) -> Timestamp {
        self.verified_at
    }
}

/// Append-only record of one processed payment. `payment_id` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount_minor: i64,
    pub currency: String,
    pub status: GatewayStatus,
    pub plan: PlanKind,
    pub subscription_type: SubscriptionType,
    pub recorded_at: Timestamp,
}

impl LedgerEntry {
    pub fn for_payment(user_id: UserId, payment: &VerifiedPayment, plan: &Plan) -> Self {
        Self {
            payment_id: payment.payment_id().clone(),
            order_id: payment.order_id().clone(),
            user_id,
            amount_minor: payment.amount_minor(),
            currency: payment.currency().to_string(),
            status: payment.status().clone(),
            plan: plan.kind,
            subscription_type: plan.subscription_type,
            recorded_at: payment.verified_at(),
        }
    }
}
