use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::info;
use uuid::Uuid;

use crate::error::StockError;

/// Atomic read-compare-write. Sentinels: -1 counter missing, -2 insufficient.
const DECREMENT_SCRIPT: &str = r#"
local stock = redis.call('GET', KEYS[1])
if stock == false then
    return -1
end
local current = tonumber(stock)
local delta = tonumber(ARGV[1])
if current < delta then
    return -2
end
local new_stock = current - delta
redis.call('SET', KEYS[1], new_stock)
return new_stock
"#;

/// Redis-backed stock counters for flash-deal SKUs, keyed
/// `hotdeal:stock:{product_id}`. Counters exist only while a deal is live;
/// `load`/`unload` bracket the deal window and are sequenced by the operator.
#[derive(Clone)]
pub struct HotdealStore {
    conn: ConnectionManager,
    decrement_script: Arc<Script>,
    enabled: bool,
}

impl HotdealStore {
    pub fn new(conn: ConnectionManager, enabled: bool) -> Self {
        Self {
            conn,
            decrement_script: Arc::new(Script::new(DECREMENT_SCRIPT)),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn key(product_id: Uuid) -> String {
        format!("hotdeal:stock:{}", product_id)
    }

    /// Seed the counter when a deal activates. No-op while disabled.
    pub async fn load(&self, product_id: Uuid, stock: i32) -> Result<(), StockError> {
        if !self.enabled {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.set(Self::key(product_id), stock).await?;
        info!(%product_id, stock, "loaded hotdeal stock counter");
        Ok(())
    }

    /// Remove the counter when a deal ends, returning what was left.
    /// An absent counter unloads as 0.
    pub async fn unload(&self, product_id: Uuid) -> Result<i32, StockError> {
        if !self.enabled {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let key = Self::key(product_id);

        let remaining: Option<i32> = conn.get(&key).await?;
        let Some(remaining) = remaining else {
            return Ok(0);
        };
        let _: () = conn.del(&key).await?;
        info!(%product_id, remaining, "unloaded hotdeal stock counter");
        Ok(remaining)
    }

    pub async fn decrement(&self, product_id: Uuid, quantity: i32) -> Result<i32, StockError> {
        if !self.enabled {
            return Err(StockError::HotdealDisabled);
        }
        let mut conn = self.conn.clone();

        let result: i64 = self
            .decrement_script
            .key(Self::key(product_id))
            .arg(quantity)
            .invoke_async(&mut conn)
            .await?;

        match result {
            -1 => Err(StockError::CounterMissing(product_id)),
            -2 => Err(StockError::Insufficient(product_id)),
            new_stock => Ok(new_stock as i32),
        }
    }

    pub async fn increment(&self, product_id: Uuid, quantity: i32) -> Result<i32, StockError> {
        if !self.enabled {
            return Err(StockError::HotdealDisabled);
        }
        let mut conn = self.conn.clone();
        let new_stock: i64 = conn.incr(Self::key(product_id), quantity).await?;
        Ok(new_stock as i32)
    }

    /// Existence probe the custody facade routes on. Disabled store never
    /// claims a counter, so everything falls through to the serializer.
    pub async fn has(&self, product_id: Uuid) -> Result<bool, StockError> {
        if !self.enabled {
            return Ok(false);
        }
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::key(product_id)).await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    //! These need a live Redis. Start one and run:
    //!
    //!   REDIS_URL=redis://localhost:6379 \
    //!     cargo test -p product-service -- --include-ignored

    use super::*;

    async fn store() -> HotdealStore {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = redis::Client::open(url).expect("redis url");
        let conn = client
            .get_connection_manager()
            .await
            .expect("redis connection");
        HotdealStore::new(conn, true)
    }

    #[tokio::test]
    #[ignore]
    async fn load_unload_round_trip() {
        let store = store().await;
        let product = Uuid::new_v4();

        assert!(!store.has(product).await.unwrap());
        store.load(product, 42).await.unwrap();
        assert!(store.has(product).await.unwrap());
        assert_eq!(store.unload(product).await.unwrap(), 42);
        assert!(!store.has(product).await.unwrap());
        assert_eq!(store.unload(product).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore]
    async fn decrement_is_atomic_under_contention() {
        let store = store().await;
        let product = Uuid::new_v4();
        store.load(product, 3).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.decrement(product, 1).await }));
        }

        let mut succeeded = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(StockError::Insufficient(_)) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(succeeded, 3);
        assert_eq!(insufficient, 2);
        assert_eq!(store.unload(product).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore]
    async fn missing_counter_is_distinguished_from_insufficient() {
        let store = store().await;
        let product = Uuid::new_v4();

        match store.decrement(product, 1).await {
            Err(StockError::CounterMissing(id)) => assert_eq!(id, product),
            other => panic!("expected CounterMissing, got {other:?}"),
        }

        store.load(product, 1).await.unwrap();
        match store.decrement(product, 2).await {
            Err(StockError::Insufficient(id)) => assert_eq!(id, product),
            other => panic!("expected Insufficient, got {other:?}"),
        }
        store.unload(product).await.unwrap();
    }
}
