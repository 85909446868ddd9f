use uuid::Uuid;

use crate::cache::ProductCache;
use crate::error::StockError;
use crate::hotdeal::HotdealStore;
use crate::stock_queue::StockSerializer;

/// Sole writer of product stock. Routes each mutation to the hotdeal counter
/// when one exists for the SKU, otherwise to the row-locked serializer, and
/// invalidates the read cache after any successful write.
#[derive(Clone)]
pub struct StockCustody {
    hotdeal: HotdealStore,
    serializer: StockSerializer,
    cache: ProductCache,
}

impl StockCustody {
    pub fn new(hotdeal: HotdealStore, serializer: StockSerializer, cache: ProductCache) -> Self {
        Self {
            hotdeal,
            serializer,
            cache,
        }
    }

    pub async fn decrease(&self, product_id: Uuid, quantity: i32) -> Result<i32, StockError> {
        let new_stock = if self.hotdeal.has(product_id).await? {
            self.hotdeal.decrement(product_id, quantity).await?
        } else {
            self.serializer.submit(product_id, -quantity).await?
        };
        self.cache.invalidate(product_id).await;
        Ok(new_stock)
    }

    pub async fn increase(&self, product_id: Uuid, quantity: i32) -> Result<i32, StockError> {
        let new_stock = if self.hotdeal.has(product_id).await? {
            self.hotdeal.increment(product_id, quantity).await?
        } else {
            self.serializer.submit(product_id, quantity).await?
        };
        self.cache.invalidate(product_id).await;
        Ok(new_stock)
    }
}
