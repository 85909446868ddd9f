use thiserror::Error;
use uuid::Uuid;

/// Failures of a stock mutation or lookup, regardless of which backend
/// (relational row or hotdeal counter) served it.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("product not found: {0}")]
    ProductNotFound(Uuid),
    #[error("hotdeal stock not found for product {0}")]
    CounterMissing(Uuid),
    #[error("insufficient stock for product {0}")]
    Insufficient(Uuid),
    #[error("hotdeal stock store disabled")]
    HotdealDisabled,
    #[error("stock serializer unavailable")]
    SerializerClosed,
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
