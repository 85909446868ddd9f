use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::Product;

/// Read-through JSON cache for plain product lookups, keyed
/// `product:{product_id}`. Deals and the locked stock path never touch it.
/// Cache failures degrade to the database read.
#[derive(Clone)]
pub struct ProductCache {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl ProductCache {
    pub fn new(conn: ConnectionManager, ttl_seconds: u64) -> Self {
        Self { conn, ttl_seconds }
    }

    fn key(product_id: Uuid) -> String {
        format!("product:{}", product_id)
    }

    pub async fn get(&self, product_id: Uuid) -> Option<Product> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = match conn.get(Self::key(product_id)).await {
            Ok(value) => value,
            Err(err) => {
                debug!(%product_id, %err, "product cache read failed");
                return None;
            }
        };
        cached.and_then(|json| serde_json::from_str(&json).ok())
    }

    pub async fn put(&self, product: &Product) {
        let Ok(json) = serde_json::to_string(product) else {
            return;
        };
        let mut conn = self.conn.clone();
        if let Err(err) = conn
            .set_ex::<_, _, ()>(Self::key(product.id), json, self.ttl_seconds)
            .await
        {
            debug!(product_id = %product.id, %err, "product cache write failed");
        }
    }

    /// Every stock mutation and product edit must call this so readers never
    /// see a stale counter longer than one round-trip.
    pub async fn invalidate(&self, product_id: Uuid) {
        let mut conn = self.conn.clone();
        if let Err(err) = conn.del::<_, ()>(Self::key(product_id)).await {
            warn!(%product_id, %err, "product cache invalidation failed");
        }
    }
}
