use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::error::StockError;

/// Applies one stock delta against the authoritative store. The production
/// implementation locks the product row inside its own transaction.
#[async_trait]
pub trait StockWriter: Send + Sync + 'static {
    async fn apply_delta(&self, product_id: Uuid, delta: i32) -> Result<i32, StockError>;
}

struct StockMutation {
    product_id: Uuid,
    delta: i32,
    reply: oneshot::Sender<Result<i32, StockError>>,
}

/// Single-consumer FIFO for ordinary-SKU stock mutations. Every mutation in
/// the process funnels through one worker, so the order in which `submit`
/// calls are accepted is the order the database observes the writes.
#[derive(Clone)]
pub struct StockSerializer {
    tx: mpsc::Sender<StockMutation>,
}

impl StockSerializer {
    /// Spawn the worker and hand back the submit side. `buffer` bounds how
    /// many mutations may queue before `submit` blocks.
    pub fn spawn<W: StockWriter>(
        writer: W,
        buffer: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<StockMutation>(buffer);

        tokio::spawn(async move {
            info!("stock serializer worker started, applying mutations in submission order");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    req = rx.recv() => {
                        let Some(StockMutation { product_id, delta, reply }) = req else {
                            break;
                        };
                        let result = writer.apply_delta(product_id, delta).await;
                        // A dropped reply means the submitter was cancelled;
                        // the mutation has already been applied either way.
                        let _ = reply.send(result);
                    }
                }
            }
            info!("stock serializer worker stopped");
        });

        Self { tx }
    }

    /// Enqueue a mutation and wait for its single-shot reply. Blocks only
    /// while the buffer is full; dropping the returned future abandons the
    /// wait without disturbing queue order.
    pub async fn submit(&self, product_id: Uuid, delta: i32) -> Result<i32, StockError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StockMutation {
                product_id,
                delta,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StockError::SerializerClosed)?;

        reply_rx.await.map_err(|_| StockError::SerializerClosed)?
    }
}
