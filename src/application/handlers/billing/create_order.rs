//! CreateOrderHandler - Command handler for issuing a gateway order.
//!
//! The price always comes from the plan catalog, never from the client.

use std::sync::Arc;

use crate::domain::billing::{OrderError, PaymentOrder, PlanCatalog, PlanKind};
use crate::domain::foundation::UserId;
use crate::ports::PaymentGateway;

/// Command to issue an order for a plan.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub user_id: UserId,
    /// Plan name as submitted by the client.
    pub plan: String,
}

/// Result of a successfully issued order.
#[derive(Debug, Clone)]
pub struct CreateOrderResult {
    pub order: PaymentOrder,
    /// Public key id the checkout widget is opened with.
    pub key_id: String,
}

pub struct CreateOrderHandler {
    gateway: Arc<dyn PaymentGateway>,
    catalog: PlanCatalog,
}

impl CreateOrderHandler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, catalog: PlanCatalog) -> Self {
        Self { gateway, catalog }
    }

    pub async fn handle(&self, cmd: CreateOrderCommand) -> Result<CreateOrderResult, OrderError> {
        let kind: PlanKind = cmd
            .plan
            .trim()
            .parse()
            .map_err(|_| OrderError::UnknownPlan(cmd.plan.clone()))?;
        let plan = self
            .catalog
            .plan_for(kind)
            .ok_or(OrderError::PlanNotOffered(kind))?;

        let order = self
            .gateway
            .create_order(plan.amount_minor, self.catalog.currency, kind, &cmd.user_id)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %cmd.user_id, plan = %kind, error = %e, "Order creation failed");
                OrderError::GatewayUnreachable(e.to_string())
            })?;

        tracing::info!(
            user_id = %cmd.user_id,
            order_id = %order.order_id,
            plan = %kind,
            amount = order.amount_minor,
            catalog_version = self.catalog.version,
            "Order issued"
        );

        Ok(CreateOrderResult {
            order,
            key_id: self.gateway.key_id().to_string(),
        })
    }
}
