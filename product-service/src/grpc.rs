use chrono::{SecondsFormat, Utc};
use tonic::{Request, Response, Status};
use tracing::error;
use uuid::Uuid;

use shared::proto;

use crate::cache::ProductCache;
use crate::error::StockError;
use crate::models::{Deal, Product};
use crate::repository::ProductRepository;
use crate::stock::StockCustody;

pub struct ProductGrpc {
    repo: ProductRepository,
    custody: StockCustody,
    cache: ProductCache,
}

impl ProductGrpc {
    pub fn new(repo: ProductRepository, custody: StockCustody, cache: ProductCache) -> Self {
        Self {
            repo,
            custody,
            cache,
        }
    }
}

#[tonic::async_trait]
impl proto::ProductService for ProductGrpc {
    async fn get_product(
        &self,
        request: Request<proto::GetProductRequest>,
    ) -> Result<Response<proto::Product>, Status> {
        let req = request.into_inner();
        let id = parse_id(&req.product_id, "product")?;

        if let Some(product) = self.cache.get(id).await {
            return Ok(Response::new(product_to_proto(&product)));
        }

        let product = self
            .repo
            .get_product(id)
            .await
            .map_err(internal)?
            .ok_or_else(|| Status::not_found(format!("product not found: {}", id)))?;

        self.cache.put(&product).await;
        Ok(Response::new(product_to_proto(&product)))
    }

    async fn get_deal(
        &self,
        request: Request<proto::GetDealRequest>,
    ) -> Result<Response<proto::Deal>, Status> {
        let req = request.into_inner();
        let id = parse_id(&req.deal_id, "deal")?;

        let (deal, product) = self
            .repo
            .get_deal_with_product(id)
            .await
            .map_err(internal)?
            .ok_or_else(|| Status::not_found(format!("deal not found: {}", id)))?;

        Ok(Response::new(deal_to_proto(&deal, &product)))
    }

    async fn update_stock(
        &self,
        request: Request<proto::UpdateStockRequest>,
    ) -> Result<Response<proto::Product>, Status> {
        let req = request.into_inner();
        let id = parse_id(&req.product_id, "product")?;

        let new_stock = if req.delta < 0 {
            self.custody.decrease(id, -req.delta).await
        } else {
            self.custody.increase(id, req.delta).await
        }
        .map_err(stock_status)?;

        // Re-read for the full row; the stock field carries the value the
        // mutation actually produced, not a later racing read.
        let product = self
            .repo
            .get_product(id)
            .await
            .map_err(internal)?
            .ok_or_else(|| Status::not_found(format!("product not found: {}", id)))?;

        let mut resp = product_to_proto(&product);
        resp.stock = new_stock;
        Ok(Response::new(resp))
    }
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(raw)
        .map_err(|err| Status::invalid_argument(format!("invalid {} ID: {}", what, err)))
}

fn stock_status(err: StockError) -> Status {
    match err {
        StockError::Insufficient(_) => Status::failed_precondition("insufficient stock"),
        StockError::ProductNotFound(id) => {
            Status::not_found(format!("product not found: {}", id))
        }
        other => internal(other),
    }
}

fn internal(err: StockError) -> Status {
    error!(%err, "stock operation failed");
    Status::internal(format!("failed to update stock: {}", err))
}

fn product_to_proto(product: &Product) -> proto::Product {
    proto::Product {
        id: product.id.to_string(),
        name: product.name.clone(),
        description: product.description.clone().unwrap_or_default(),
        price: product.price,
        stock: product.stock,
        created_at: product.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        updated_at: product.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

fn deal_to_proto(deal: &Deal, product: &Product) -> proto::Deal {
    proto::Deal {
        id: deal.id.to_string(),
        product_id: deal.product_id.to_string(),
        deal_price: deal.deal_price,
        stock_limit: deal.deal_stock,
        start_time: deal.starts_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        end_time: deal.ends_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        status: deal.status_at(Utc::now()).as_str().to_string(),
        product: Some(product_to_proto(product)),
    }
}
