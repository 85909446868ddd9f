use std::time::Duration;

use anyhow::Result;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::OrderStatus;
use crate::queue::{OrderQueue, QueuedOrder};
use crate::store;

type DbPool = Pool<AsyncPgConnection>;

const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Drains the order queue and materializes each placement as a confirmed
/// order row. Stock was already debited before the placement was enqueued,
/// so the row is born `confirmed`, never `pending`.
pub struct OrderWorker {
    queue: OrderQueue,
    pool: DbPool,
}

impl OrderWorker {
    pub fn new(queue: OrderQueue, pool: DbPool) -> Self {
        Self { queue, pool }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!("order worker started, consuming from the order queue");
        tokio::spawn(
            self.queue
                .clone()
                .log_stats(STATS_INTERVAL, shutdown.clone()),
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.queue.dequeue(DEQUEUE_TIMEOUT) => match result {
                    Ok(Some(request)) => {
                        if let Err(err) = self.materialize(&request).await {
                            error!(order_id = %request.order_id, %err, "failed to materialize queued order");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => error!(%err, "order queue dequeue failed"),
                },
            }
        }
        info!("order worker stopped");
    }

    /// One transaction per placement: the order row (with its pre-allocated
    /// id) and all items land together or not at all.
    async fn materialize(&self, request: &QueuedOrder) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let total_amount: i32 = request.items.iter().map(|item| item.subtotal()).sum();
        let queued = request.clone();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            Box::pin(async move {
                let order = store::create_order_with_id(
                    conn,
                    queued.order_id,
                    queued.user_id,
                    total_amount,
                    OrderStatus::Confirmed,
                    queued.shipping_address.as_ref(),
                )
                .await?;

                for item in &queued.items {
                    store::create_item(conn, order.id, item).await?;
                }

                Ok(())
            })
        })
        .await?;

        info!(order_id = %request.order_id, total_amount, "queued order materialized");
        Ok(())
    }
}
