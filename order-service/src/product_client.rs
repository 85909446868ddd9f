use async_trait::async_trait;
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request};
use tracing::debug;
use uuid::Uuid;

use shared::proto;

/// Product fields the placement pipeline consumes.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub id: Uuid,
    pub name: String,
    pub price: i32,
    pub stock: i32,
}

#[derive(Debug, Clone)]
pub struct DealInfo {
    pub id: Uuid,
    pub product_id: Uuid,
    pub deal_price: i32,
    pub status: String,
    pub product: ProductInfo,
}

#[derive(Debug, Clone)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub stock: i32,
}

/// Error surfaced by the stock service, already mapped to the order API's
/// error taxonomy: `{code, message, http status}`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    pub code: String,
    pub message: String,
    pub status: u16,
}

impl ClientError {
    fn upstream(resource: &str, detail: impl std::fmt::Display) -> Self {
        Self {
            code: "PRODUCT_SERVICE_ERROR".to_string(),
            message: format!("{} service error: {}", resource, detail),
            status: 502,
        }
    }
}

/// Seam between the orchestrator and the stock service; tests substitute an
/// in-memory implementation.
#[async_trait]
pub trait ProductGateway: Send + Sync + 'static {
    async fn get_product(&self, product_id: Uuid) -> Result<ProductInfo, ClientError>;
    async fn get_deal(&self, deal_id: Uuid) -> Result<DealInfo, ClientError>;
    async fn decrease_stock(&self, product_id: Uuid, quantity: i32)
        -> Result<StockLevel, ClientError>;
    async fn increase_stock(&self, product_id: Uuid, quantity: i32)
        -> Result<StockLevel, ClientError>;
}

#[derive(Clone)]
pub struct GrpcProductGateway {
    client: proto::ProductServiceClient<Channel>,
}

impl GrpcProductGateway {
    /// Connects lazily; the first RPC establishes the channel, so a stock
    /// service that comes up later does not fail order-service bootstrap.
    pub fn connect(addr: &str) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(addr.to_string())?.connect_lazy();
        Ok(Self {
            client: proto::ProductServiceClient::new(channel),
        })
    }
}

#[async_trait]
impl ProductGateway for GrpcProductGateway {
    async fn get_product(&self, product_id: Uuid) -> Result<ProductInfo, ClientError> {
        let response = self
            .client
            .clone()
            .get_product(Request::new(proto::GetProductRequest {
                product_id: product_id.to_string(),
            }))
            .await
            .map_err(|status| map_status(status, "product", product_id))?;

        let info = product_info(response.into_inner())?;
        debug!(product_id = %info.id, price = info.price, stock = info.stock, "product fetched");
        Ok(info)
    }

    async fn get_deal(&self, deal_id: Uuid) -> Result<DealInfo, ClientError> {
        let response = self
            .client
            .clone()
            .get_deal(Request::new(proto::GetDealRequest {
                deal_id: deal_id.to_string(),
            }))
            .await
            .map_err(|status| map_status(status, "deal", deal_id))?;

        let deal = response.into_inner();
        let product = deal
            .product
            .ok_or_else(|| ClientError::upstream("deal", "response missing product"))?;

        Ok(DealInfo {
            id: parse_uuid(&deal.id, "deal")?,
            product_id: parse_uuid(&deal.product_id, "deal")?,
            deal_price: deal.deal_price,
            status: deal.status,
            product: product_info(product)?,
        })
    }

    async fn decrease_stock(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<StockLevel, ClientError> {
        let response = self
            .client
            .clone()
            .update_stock(Request::new(proto::UpdateStockRequest {
                product_id: product_id.to_string(),
                delta: -quantity,
            }))
            .await
            .map_err(|status| {
                if status.code() == Code::FailedPrecondition {
                    ClientError {
                        code: "INSUFFICIENT_STOCK".to_string(),
                        message: "insufficient stock".to_string(),
                        status: 400,
                    }
                } else {
                    map_status(status, "product", product_id)
                }
            })?;

        let product = response.into_inner();
        let level = StockLevel {
            product_id: parse_uuid(&product.id, "product")?,
            stock: product.stock,
        };
        debug!(product_id = %level.product_id, quantity, stock = level.stock, "stock decreased");
        Ok(level)
    }

    async fn increase_stock(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<StockLevel, ClientError> {
        let response = self
            .client
            .clone()
            .update_stock(Request::new(proto::UpdateStockRequest {
                product_id: product_id.to_string(),
                delta: quantity,
            }))
            .await
            .map_err(|status| map_status(status, "product", product_id))?;

        let product = response.into_inner();
        let level = StockLevel {
            product_id: parse_uuid(&product.id, "product")?,
            stock: product.stock,
        };
        debug!(product_id = %level.product_id, quantity, stock = level.stock, "stock restored");
        Ok(level)
    }
}

/// NotFound → 404 {RESOURCE}_NOT_FOUND, InvalidArgument → 400
/// INVALID_{RESOURCE}_ID, anything else → 502 PRODUCT_SERVICE_ERROR.
fn map_status(status: tonic::Status, resource: &str, id: Uuid) -> ClientError {
    match status.code() {
        Code::NotFound => ClientError {
            code: format!("{}_NOT_FOUND", resource.to_uppercase()),
            message: format!("{} not found: {}", resource, id),
            status: 404,
        },
        Code::InvalidArgument => ClientError {
            code: format!("INVALID_{}_ID", resource.to_uppercase()),
            message: status.message().to_string(),
            status: 400,
        },
        _ => ClientError::upstream(resource, status.message()),
    }
}

fn product_info(product: proto::Product) -> Result<ProductInfo, ClientError> {
    Ok(ProductInfo {
        id: parse_uuid(&product.id, "product")?,
        name: product.name,
        price: product.price,
        stock: product.stock,
    })
}

fn parse_uuid(raw: &str, resource: &str) -> Result<Uuid, ClientError> {
    Uuid::parse_str(raw)
        .map_err(|_| ClientError::upstream(resource, format!("malformed id in response: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_the_error_taxonomy() {
        let id = Uuid::new_v4();

        let err = map_status(tonic::Status::not_found("missing"), "deal", id);
        assert_eq!(err.code, "DEAL_NOT_FOUND");
        assert_eq!(err.status, 404);

        let err = map_status(tonic::Status::invalid_argument("bad id"), "product", id);
        assert_eq!(err.code, "INVALID_PRODUCT_ID");
        assert_eq!(err.status, 400);

        let err = map_status(tonic::Status::internal("boom"), "product", id);
        assert_eq!(err.code, "PRODUCT_SERVICE_ERROR");
        assert_eq!(err.status, 502);

        let err = map_status(tonic::Status::unavailable("down"), "product", id);
        assert_eq!(err.code, "PRODUCT_SERVICE_ERROR");
        assert_eq!(err.status, 502);
    }
}
