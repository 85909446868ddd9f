use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{PricedItem, ShippingAddress};

pub const ORDER_QUEUE_KEY: &str = "order:queue";

/// A confirmed placement waiting for the worker to write it to the database.
/// Serialized as self-describing JSON; consumers ignore fields they do not
/// know, so producers may add fields without breaking older workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOrder {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<PricedItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable FIFO over the `order:queue` redis list: producers LPUSH, the
/// single worker BRPOPs.
#[derive(Clone)]
pub struct OrderQueue {
    conn: ConnectionManager,
}

impl OrderQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn enqueue(&self, request: &QueuedOrder) -> Result<(), QueueError> {
        let payload = serde_json::to_string(request)?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(ORDER_QUEUE_KEY, payload).await?;
        Ok(())
    }

    /// Blocking pop bounded by `timeout` so shutdown signals are observed.
    /// A payload that fails to decode is logged and dropped.
    // TODO: push undecodable payloads to a dead-letter list instead of
    // dropping them.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedOrder>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .brpop(ORDER_QUEUE_KEY, timeout.as_secs_f64())
            .await?;

        let Some((_key, payload)) = popped else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(request) => Ok(Some(request)),
            Err(err) => {
                error!(%err, "dropping undecodable queued order");
                Ok(None)
            }
        }
    }

    pub async fn len(&self) -> Result<i64, QueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(ORDER_QUEUE_KEY).await?)
    }

    /// Periodically report backlog depth until cancelled.
    pub async fn log_stats(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => match self.len().await {
                    Ok(length) if length > 0 => info!(length, "order queue backlog"),
                    Ok(_) => {}
                    Err(err) => warn!(%err, "failed to read order queue length"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueuedOrder {
        QueuedOrder {
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            items: vec![PricedItem {
                product_id: Uuid::new_v4(),
                deal_id: Some(Uuid::new_v4()),
                product_name: "A".to_string(),
                quantity: 2,
                unit_price: 1000,
            }],
            shipping_address: Some(ShippingAddress {
                recipient_name: "Jamie".to_string(),
                phone: "010-0000-0000".to_string(),
                address: "1 Main St".to_string(),
                address_detail: None,
                postal_code: "04524".to_string(),
            }),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn queued_order_json_round_trip() {
        let original = sample();
        let json = serde_json::to_string(&original).unwrap();
        let decoded: QueuedOrder = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.order_id, original.order_id);
        assert_eq!(decoded.user_id, original.user_id);
        assert_eq!(decoded.items.len(), 1);
        assert_eq!(decoded.items[0].unit_price, 1000);
        assert_eq!(
            decoded.shipping_address.unwrap().recipient_name,
            "Jamie"
        );
    }

    #[test]
    fn consumer_tolerates_schema_additions() {
        let order_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let product_id = Uuid::new_v4();
        // A future producer added fields this consumer has never heard of.
        let json = format!(
            r#"{{
                "order_id": "{order_id}",
                "user_id": "{user_id}",
                "items": [{{
                    "product_id": "{product_id}",
                    "product_name": "A",
                    "quantity": 1,
                    "unit_price": 500,
                    "gift_wrap": true
                }}],
                "created_at": "2025-06-10T00:00:00Z",
                "priority": "high",
                "trace": {{"span": "abc"}}
            }}"#
        );

        let decoded: QueuedOrder = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.order_id, order_id);
        assert_eq!(decoded.items[0].deal_id, None);
        assert!(decoded.shipping_address.is_none());
    }
}
