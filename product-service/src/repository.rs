use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::error::StockError;
use crate::models::{Deal, Product};
use crate::schema::{deals, products};
use crate::stock_queue::StockWriter;

type DbPool = Pool<AsyncPgConnection>;

/// Relational read side plus the locked stock writer the serializer drains
/// into. All ordinary-SKU stock mutations go through `apply_delta`; nothing
/// else writes `products.stock`.
#[derive(Clone)]
pub struct ProductRepository {
    pool: DbPool,
}

impl ProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StockError> {
        let mut conn = self.pool.get().await.map_err(|e| StockError::Pool(e.to_string()))?;

        let product = products::table
            .filter(products::id.eq(id))
            .first::<Product>(&mut conn)
            .await
            .optional()?;
        Ok(product)
    }

    /// Deal joined to its product in one query; deals always read the
    /// database directly, never the cache.
    pub async fn get_deal_with_product(
        &self,
        id: Uuid,
    ) -> Result<Option<(Deal, Product)>, StockError> {
        let mut conn = self.pool.get().await.map_err(|e| StockError::Pool(e.to_string()))?;

        let row = deals::table
            .inner_join(products::table)
            .filter(deals::id.eq(id))
            .first::<(Deal, Product)>(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }
}

#[async_trait]
impl StockWriter for ProductRepository {
    /// One transaction per mutation: lock the row, validate, write, commit.
    /// The caller (the serializer worker) guarantees these run one at a time,
    /// so the lock queue on any row is never deeper than one.
    async fn apply_delta(&self, product_id: Uuid, delta: i32) -> Result<i32, StockError> {
        let mut conn = self.pool.get().await.map_err(|e| StockError::Pool(e.to_string()))?;

        conn.transaction::<_, StockError, _>(|conn| {
            Box::pin(async move {
                let current = products::table
                    .filter(products::id.eq(product_id))
                    .select(products::stock)
                    .for_update()
                    .first::<i32>(conn)
                    .await
                    .optional()?
                    .ok_or(StockError::ProductNotFound(product_id))?;

                let new_stock = current + delta;
                if new_stock < 0 {
                    return Err(StockError::Insufficient(product_id));
                }

                diesel::update(products::table.filter(products::id.eq(product_id)))
                    .set((
                        products::stock.eq(new_stock),
                        products::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;

                Ok(new_stock)
            })
        })
        .await
    }
}
