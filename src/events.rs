//! Lifecycle event publishing
//!
//! Best-effort NATS notifications for downstream consumers (fulfilment,
//! notifications). Publishing never fails a request; errors are logged and
//! dropped. With no NATS URL configured the publisher is a no-op.

use serde::Serialize;
use uuid::Uuid;

#[derive(Clone)]
pub struct EventPublisher {
    client: Option<async_nats::Client>,
}

#[derive(Debug, Serialize)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub total_amount: i64,
}

#[derive(Debug, Serialize)]
pub struct PaymentEvent {
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub transaction_id: Option<String>,
}

impl EventPublisher {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn publish(&self, subject: &'static str, event: &impl Serialize) {
        let Some(client) = &self.client else { return };
        let payload = match serde_json::to_vec(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(subject, error = %e, "failed to serialize event");
                return;
            }
        };
        if let Err(e) = client.publish(subject, payload.into()).await {
            tracing::warn!(subject, error = %e, "failed to publish event");
        }
    }
}

pub mod subjects {
    pub const ORDER_CREATED: &str = "commerce.orders.created";
    pub const ORDER_CANCELLED: &str = "commerce.orders.cancelled";
    pub const PAYMENT_SETTLED: &str = "commerce.payments.settled";
    pub const PAYMENT_FAILED: &str = "commerce.payments.failed";
}
