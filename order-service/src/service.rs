//! The placement saga: price against the stock service, debit stock through
//! its custody facade, then persist inline or hand off to the queue. Every
//! step that can fail after a stock debit compensates by restoring what was
//! already taken.

use chrono::{DateTime, Utc};
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::{Order, OrderItem, OrderStatus, PricedItem, ShippingAddress};
use crate::product_client::{ClientError, ProductGateway};
use crate::queue::{OrderQueue, QueuedOrder};
use crate::store;

type DbPool = Pool<AsyncPgConnection>;

pub const DEAL_STATUS_ACTIVE: &str = "active";
/// Reported for async placements before the worker has written the row.
pub const STATUS_PROCESSING: &str = "processing";

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub code: String,
    pub message: String,
    pub status: u16,
}

impl ServiceError {
    pub fn new(code: &str, message: impl Into<String>, status: u16) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            status,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new("INVALID_REQUEST", message, 400)
    }

    pub fn not_found() -> Self {
        Self::new("NOT_FOUND", "order not found", 404)
    }

    pub fn forbidden() -> Self {
        Self::new("FORBIDDEN", "not the owner of this order", 403)
    }

    pub fn cannot_confirm(status: &str) -> Self {
        Self::new(
            "CANNOT_CONFIRM",
            format!("order cannot be confirmed from status: {status}"),
            400,
        )
    }

    pub fn cannot_cancel(status: &str) -> Self {
        Self::new(
            "CANNOT_CANCEL",
            format!("order cannot be cancelled from status: {status}"),
            400,
        )
    }

    pub fn create_failed() -> Self {
        Self::new("CREATE_FAILED", "failed to create order", 500)
    }

    pub fn confirm_failed() -> Self {
        Self::new("CONFIRM_FAILED", "failed to confirm order", 500)
    }

    pub fn cancel_failed() -> Self {
        Self::new("CANCEL_FAILED", "failed to cancel order", 500)
    }

    pub fn queue_failed() -> Self {
        Self::new("QUEUE_FAILED", "failed to enqueue order", 500)
    }

    pub fn queue_not_initialized() -> Self {
        Self::new("QUEUE_NOT_INITIALIZED", "order queue is not initialized", 500)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message, 500)
    }
}

impl From<ClientError> for ServiceError {
    fn from(err: ClientError) -> Self {
        Self {
            code: err.code,
            message: err.message,
            status: err.status,
        }
    }
}

/// Errors crossing a transaction boundary: either a policy decision that
/// must surface verbatim, or a database failure the caller maps to its
/// operation-specific code.
enum TxError {
    Service(ServiceError),
    Db(diesel::result::Error),
}

impl From<ServiceError> for TxError {
    fn from(err: ServiceError) -> Self {
        TxError::Service(err)
    }
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Db(err)
    }
}

#[derive(Debug, Clone)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub deal_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub product_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: i32,
    pub subtotal: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderItemResponse>,
    pub total_amount: i32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderResponse {
    fn from_rows(order: Order, items: Vec<OrderItem>) -> Self {
        let shipping_address = order.shipping_address();
        Self {
            id: order.id,
            user_id: order.user_id,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    id: Some(item.id),
                    product_id: item.product_id,
                    deal_id: item.deal_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    subtotal: item.subtotal,
                })
                .collect(),
            total_amount: order.total_amount,
            status: order.status,
            shipping_address,
            cancelled_at: order.cancelled_at,
            cancel_reason: order.cancel_reason,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

pub struct OrderService<P> {
    pool: DbPool,
    gateway: P,
    queue: Option<OrderQueue>,
}

impl<P: ProductGateway> OrderService<P> {
    pub fn new(pool: DbPool, gateway: P) -> Self {
        Self {
            pool,
            gateway,
            queue: None,
        }
    }

    /// Enables async placement; without a queue `create_order_async` fails
    /// with QUEUE_NOT_INITIALIZED.
    pub fn with_queue(mut self, queue: OrderQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    async fn conn(
        &self,
    ) -> Result<diesel_async::pooled_connection::bb8::PooledConnection<'_, AsyncPgConnection>, ServiceError>
    {
        self.pool
            .get()
            .await
            .map_err(|err| ServiceError::internal(format!("connection pool error: {err}")))
    }

    /// Synchronous placement: price, debit stock, persist inline. Any
    /// persistence failure restores the debited stock before surfacing.
    pub async fn create_order(
        &self,
        user_id: Uuid,
        items: Vec<OrderItemRequest>,
        shipping: Option<ShippingAddress>,
    ) -> Result<OrderResponse, ServiceError> {
        let (priced, total_amount) = price_items(&self.gateway, &items).await?;
        let debited = debit_stock(&self.gateway, &items).await?;

        let mut conn = match self.conn().await {
            Ok(conn) => conn,
            Err(err) => {
                restore_stock(&self.gateway, &debited).await;
                return Err(err);
            }
        };

        let priced_rows = priced.clone();
        let shipping_cols = shipping.clone();
        let result = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    let order = store::create_order(
                        conn,
                        user_id,
                        total_amount,
                        OrderStatus::Pending,
                        shipping_cols.as_ref(),
                    )
                    .await?;

                    let mut rows = Vec::with_capacity(priced_rows.len());
                    for item in &priced_rows {
                        rows.push(store::create_item(conn, order.id, item).await?);
                    }

                    Ok((order, rows))
                })
            })
            .await;

        match result {
            Ok((order, rows)) => Ok(OrderResponse::from_rows(order, rows)),
            Err(err) => {
                restore_stock(&self.gateway, &debited).await;
                error!(%err, "order placement transaction failed");
                Err(ServiceError::create_failed())
            }
        }
    }

    /// Async placement: price and debit exactly like the sync path, then
    /// enqueue the priced placement under a pre-allocated order id and
    /// return immediately. The worker materializes the row later, so reads
    /// of the id can miss until then.
    pub async fn create_order_async(
        &self,
        user_id: Uuid,
        items: Vec<OrderItemRequest>,
        shipping: Option<ShippingAddress>,
    ) -> Result<OrderResponse, ServiceError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(ServiceError::queue_not_initialized)?;

        let order_id = Uuid::new_v4();
        let (priced, total_amount) = price_items(&self.gateway, &items).await?;
        let debited = debit_stock(&self.gateway, &items).await?;

        let queued = QueuedOrder {
            order_id,
            user_id,
            items: priced.clone(),
            shipping_address: shipping.clone(),
            created_at: Utc::now(),
        };

        if let Err(err) = queue.enqueue(&queued).await {
            restore_stock(&self.gateway, &debited).await;
            error!(%order_id, %err, "failed to enqueue order");
            return Err(ServiceError::queue_failed());
        }

        let now = Utc::now();
        Ok(OrderResponse {
            id: order_id,
            user_id,
            items: priced
                .into_iter()
                .map(|item| OrderItemResponse {
                    id: None,
                    product_id: item.product_id,
                    deal_id: item.deal_id,
                    subtotal: item.subtotal(),
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            total_amount,
            status: STATUS_PROCESSING.to_string(),
            shipping_address: shipping,
            cancelled_at: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let mut conn = self.conn().await?;

        let order = store::get(&mut conn, order_id)
            .await
            .map_err(|err| ServiceError::internal(err.to_string()))?
            .ok_or_else(ServiceError::not_found)?;

        if order.user_id != user_id {
            return Err(ServiceError::forbidden());
        }

        let items = store::list_items(&mut conn, order_id)
            .await
            .map_err(|err| ServiceError::internal(err.to_string()))?;

        Ok(OrderResponse::from_rows(order, items))
    }

    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: i64,
        size: i64,
        status: Option<OrderStatus>,
    ) -> Result<(Vec<OrderResponse>, i64), ServiceError> {
        let mut conn = self.conn().await?;
        let offset = (page - 1) * size;

        let total = store::count_by_user(&mut conn, user_id, status)
            .await
            .map_err(|err| ServiceError::internal(err.to_string()))?;

        let orders = store::list_by_user(&mut conn, user_id, size, offset, status)
            .await
            .map_err(|err| ServiceError::internal(err.to_string()))?;

        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            let items = store::list_items(&mut conn, order.id).await.unwrap_or_default();
            responses.push(OrderResponse::from_rows(order, items));
        }

        Ok((responses, total))
    }

    /// Confirmation takes the row lock, re-checks ownership and the pending
    /// precondition under it, then flips the status. No stock side effect:
    /// stock was debited at placement.
    pub async fn confirm_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let mut conn = self.conn().await.map_err(|_| ServiceError::confirm_failed())?;

        let result = conn
            .transaction::<_, TxError, _>(|conn| {
                Box::pin(async move {
                    let order = store::get_for_update(conn, order_id)
                        .await?
                        .ok_or_else(ServiceError::not_found)?;

                    if order.user_id != user_id {
                        return Err(ServiceError::forbidden().into());
                    }
                    match OrderStatus::parse(&order.status) {
                        Some(status) if status.can_confirm() => {}
                        _ => return Err(ServiceError::cannot_confirm(&order.status).into()),
                    }

                    Ok(store::confirm(conn, order_id).await?)
                })
            })
            .await
            .map_err(|err| match err {
                TxError::Service(err) => err,
                TxError::Db(err) => {
                    error!(%order_id, %err, "order confirmation failed");
                    ServiceError::confirm_failed()
                }
            })?;

        let items = store::list_items(&mut conn, order_id).await.unwrap_or_default();
        Ok(OrderResponse::from_rows(result, items))
    }

    /// Cancellation commits the state change first, then restores stock.
    /// The restoration spans two stores, so it deliberately runs outside
    /// the transaction; a failure there leaves inventory understated and is
    /// only logged.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let mut conn = self.conn().await.map_err(|_| ServiceError::cancel_failed())?;

        let reason_col = reason.clone();
        let (order, items) = conn
            .transaction::<_, TxError, _>(|conn| {
                Box::pin(async move {
                    let order = store::get_for_update(conn, order_id)
                        .await?
                        .ok_or_else(ServiceError::not_found)?;

                    if order.user_id != user_id {
                        return Err(ServiceError::forbidden().into());
                    }
                    match OrderStatus::parse(&order.status) {
                        Some(status) if status.can_cancel() => {}
                        _ => return Err(ServiceError::cannot_cancel(&order.status).into()),
                    }

                    let items = store::list_items(conn, order_id).await?;
                    let order = store::cancel(conn, order_id, reason_col.as_deref()).await?;

                    Ok((order, items))
                })
            })
            .await
            .map_err(|err| match err {
                TxError::Service(err) => err,
                TxError::Db(err) => {
                    error!(%order_id, %err, "order cancellation failed");
                    ServiceError::cancel_failed()
                }
            })?;

        for item in &items {
            if let Err(err) = self
                .gateway
                .increase_stock(item.product_id, item.quantity)
                .await
            {
                warn!(
                    %order_id,
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    %err,
                    "failed to restore stock after cancellation"
                );
            }
        }

        Ok(OrderResponse::from_rows(order, items))
    }
}

/// Price every line, capturing name and unit price. Deal lines must
/// reference an active deal for the same product; the deal price wins.
async fn price_items<P: ProductGateway>(
    gateway: &P,
    items: &[OrderItemRequest],
) -> Result<(Vec<PricedItem>, i32), ServiceError> {
    let mut priced = Vec::with_capacity(items.len());
    let mut total_amount: i32 = 0;

    for item in items {
        if item.quantity <= 0 {
            return Err(ServiceError::invalid_request("quantity must be positive"));
        }

        let (unit_price, product_name) = match item.deal_id {
            Some(deal_id) => {
                let deal = gateway.get_deal(deal_id).await?;
                if deal.product_id != item.product_id {
                    return Err(ServiceError::new(
                        "INVALID_DEAL",
                        format!("deal {} does not apply to product {}", deal.id, item.product_id),
                        400,
                    ));
                }
                if deal.status != DEAL_STATUS_ACTIVE {
                    return Err(ServiceError::new(
                        "DEAL_NOT_ACTIVE",
                        format!("deal {} is not active", deal.id),
                        400,
                    ));
                }
                (deal.deal_price, deal.product.name)
            }
            None => {
                let product = gateway.get_product(item.product_id).await?;
                (product.price, product.name)
            }
        };

        let line = PricedItem {
            product_id: item.product_id,
            deal_id: item.deal_id,
            product_name,
            quantity: item.quantity,
            unit_price,
        };
        total_amount += line.subtotal();
        priced.push(line);
    }

    Ok((priced, total_amount))
}

/// Debit stock one line at a time. On any failure the lines already debited
/// are restored (best effort) and the original error surfaces.
async fn debit_stock<P: ProductGateway>(
    gateway: &P,
    items: &[OrderItemRequest],
) -> Result<Vec<(Uuid, i32)>, ServiceError> {
    let mut debited: Vec<(Uuid, i32)> = Vec::with_capacity(items.len());

    for item in items {
        if let Err(err) = gateway.decrease_stock(item.product_id, item.quantity).await {
            restore_stock(gateway, &debited).await;
            return Err(err.into());
        }
        debited.push((item.product_id, item.quantity));
    }

    Ok(debited)
}

/// Reverse of the debit order. Failures are logged, never surfaced: the
/// caller's primary operation already settled and inventory drift is
/// reconciled out of band.
async fn restore_stock<P: ProductGateway>(gateway: &P, debited: &[(Uuid, i32)]) {
    for &(product_id, quantity) in debited.iter().rev() {
        if let Err(err) = gateway.increase_stock(product_id, quantity).await {
            warn!(%product_id, quantity, %err, "failed to restore stock during rollback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product_client::{DealInfo, ProductInfo, StockLevel};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Decrease(Uuid, i32),
        Increase(Uuid, i32),
    }

    #[derive(Default)]
    struct MockGateway {
        products: HashMap<Uuid, ProductInfo>,
        deals: HashMap<Uuid, DealInfo>,
        stock: Mutex<HashMap<Uuid, i32>>,
        calls: Mutex<Vec<Call>>,
        fail_increase: bool,
    }

    impl MockGateway {
        fn with_product(mut self, id: Uuid, name: &str, price: i32, stock: i32) -> Self {
            self.products.insert(
                id,
                ProductInfo {
                    id,
                    name: name.to_string(),
                    price,
                    stock,
                },
            );
            self.stock.lock().unwrap().insert(id, stock);
            self
        }

        fn with_deal(mut self, id: Uuid, product_id: Uuid, deal_price: i32, status: &str) -> Self {
            let product = self
                .products
                .get(&product_id)
                .cloned()
                .expect("deal product must be registered first");
            self.deals.insert(
                id,
                DealInfo {
                    id,
                    product_id,
                    deal_price,
                    status: status.to_string(),
                    product,
                },
            );
            self
        }

        fn stock_of(&self, id: Uuid) -> i32 {
            *self.stock.lock().unwrap().get(&id).unwrap()
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProductGateway for std::sync::Arc<MockGateway> {
        async fn get_product(&self, product_id: Uuid) -> Result<ProductInfo, ClientError> {
            self.products.get(&product_id).cloned().ok_or(ClientError {
                code: "PRODUCT_NOT_FOUND".to_string(),
                message: format!("product not found: {product_id}"),
                status: 404,
            })
        }

        async fn get_deal(&self, deal_id: Uuid) -> Result<DealInfo, ClientError> {
            self.deals.get(&deal_id).cloned().ok_or(ClientError {
                code: "DEAL_NOT_FOUND".to_string(),
                message: format!("deal not found: {deal_id}"),
                status: 404,
            })
        }

        async fn decrease_stock(
            &self,
            product_id: Uuid,
            quantity: i32,
        ) -> Result<StockLevel, ClientError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Decrease(product_id, quantity));
            let mut stock = self.stock.lock().unwrap();
            let current = *stock.get(&product_id).ok_or(ClientError {
                code: "PRODUCT_NOT_FOUND".to_string(),
                message: format!("product not found: {product_id}"),
                status: 404,
            })?;
            if current < quantity {
                return Err(ClientError {
                    code: "INSUFFICIENT_STOCK".to_string(),
                    message: "insufficient stock".to_string(),
                    status: 400,
                });
            }
            stock.insert(product_id, current - quantity);
            Ok(StockLevel {
                product_id,
                stock: current - quantity,
            })
        }

        async fn increase_stock(
            &self,
            product_id: Uuid,
            quantity: i32,
        ) -> Result<StockLevel, ClientError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Increase(product_id, quantity));
            if self.fail_increase {
                return Err(ClientError {
                    code: "PRODUCT_SERVICE_ERROR".to_string(),
                    message: "product service error: unavailable".to_string(),
                    status: 502,
                });
            }
            let mut stock = self.stock.lock().unwrap();
            let current = *stock.get(&product_id).unwrap_or(&0);
            stock.insert(product_id, current + quantity);
            Ok(StockLevel {
                product_id,
                stock: current + quantity,
            })
        }
    }

    fn line(product_id: Uuid, quantity: i32) -> OrderItemRequest {
        OrderItemRequest {
            product_id,
            deal_id: None,
            quantity,
        }
    }

    #[tokio::test]
    async fn pricing_captures_name_and_unit_price() {
        let product = Uuid::new_v4();
        let gateway =
            std::sync::Arc::new(MockGateway::default().with_product(product, "A", 1000, 10));

        let (priced, total) = price_items(&gateway, &[line(product, 2)]).await.unwrap();

        assert_eq!(total, 2000);
        assert_eq!(priced.len(), 1);
        assert_eq!(priced[0].unit_price, 1000);
        assert_eq!(priced[0].product_name, "A");
        assert_eq!(priced[0].subtotal(), 2000);
    }

    #[tokio::test]
    async fn deal_lines_price_at_the_deal_price() {
        let product = Uuid::new_v4();
        let deal = Uuid::new_v4();
        let gateway = std::sync::Arc::new(
            MockGateway::default()
                .with_product(product, "A", 1000, 10)
                .with_deal(deal, product, 500, DEAL_STATUS_ACTIVE),
        );

        let request = OrderItemRequest {
            product_id: product,
            deal_id: Some(deal),
            quantity: 1,
        };
        let (priced, total) = price_items(&gateway, &[request]).await.unwrap();

        assert_eq!(total, 500);
        assert_eq!(priced[0].unit_price, 500);
        assert_eq!(priced[0].deal_id, Some(deal));
        assert_eq!(priced[0].product_name, "A");
    }

    #[tokio::test]
    async fn deal_for_a_different_product_is_rejected() {
        let product = Uuid::new_v4();
        let other = Uuid::new_v4();
        let deal = Uuid::new_v4();
        let gateway = std::sync::Arc::new(
            MockGateway::default()
                .with_product(product, "A", 1000, 10)
                .with_product(other, "B", 2000, 10)
                .with_deal(deal, product, 500, DEAL_STATUS_ACTIVE),
        );

        let request = OrderItemRequest {
            product_id: other,
            deal_id: Some(deal),
            quantity: 1,
        };
        let err = price_items(&gateway, &[request]).await.unwrap_err();
        assert_eq!(err.code, "INVALID_DEAL");
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn inactive_deal_is_rejected() {
        let product = Uuid::new_v4();
        let deal = Uuid::new_v4();
        let gateway = std::sync::Arc::new(
            MockGateway::default()
                .with_product(product, "A", 1000, 10)
                .with_deal(deal, product, 500, "ended"),
        );

        let request = OrderItemRequest {
            product_id: product,
            deal_id: Some(deal),
            quantity: 1,
        };
        let err = price_items(&gateway, &[request]).await.unwrap_err();
        assert_eq!(err.code, "DEAL_NOT_ACTIVE");
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected() {
        let product = Uuid::new_v4();
        let gateway =
            std::sync::Arc::new(MockGateway::default().with_product(product, "A", 1000, 10));

        let err = price_items(&gateway, &[line(product, 0)]).await.unwrap_err();
        assert_eq!(err.code, "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn failed_debit_rolls_back_earlier_lines() {
        let p = Uuid::new_v4();
        let q = Uuid::new_v4();
        let gateway = std::sync::Arc::new(
            MockGateway::default()
                .with_product(p, "P", 1000, 10)
                .with_product(q, "Q", 1000, 0),
        );

        let err = debit_stock(&gateway, &[line(p, 1), line(q, 1)])
            .await
            .unwrap_err();

        assert_eq!(err.code, "INSUFFICIENT_STOCK");
        assert_eq!(gateway.stock_of(p), 10);
        assert_eq!(
            gateway.calls(),
            vec![
                Call::Decrease(p, 1),
                Call::Decrease(q, 1),
                Call::Increase(p, 1),
            ]
        );
    }

    #[tokio::test]
    async fn rollback_runs_in_reverse_debit_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let gateway = std::sync::Arc::new(
            MockGateway::default()
                .with_product(a, "A", 100, 5)
                .with_product(b, "B", 100, 5)
                .with_product(c, "C", 100, 0),
        );

        let err = debit_stock(&gateway, &[line(a, 2), line(b, 3), line(c, 1)])
            .await
            .unwrap_err();
        assert_eq!(err.code, "INSUFFICIENT_STOCK");

        let calls = gateway.calls();
        assert_eq!(
            &calls[3..],
            &[Call::Increase(b, 3), Call::Increase(a, 2)],
            "rollback must undo debits newest-first"
        );
        assert_eq!(gateway.stock_of(a), 5);
        assert_eq!(gateway.stock_of(b), 5);
    }

    #[tokio::test]
    async fn rollback_failures_are_swallowed() {
        let a = Uuid::new_v4();
        let gateway = std::sync::Arc::new(MockGateway {
            fail_increase: true,
            ..MockGateway::default()
        });

        // Must not panic or surface anything; the original error owns the
        // response.
        restore_stock(&gateway, &[(a, 2)]).await;
        assert_eq!(gateway.calls(), vec![Call::Increase(a, 2)]);
    }

    #[tokio::test]
    async fn successful_debit_reports_every_line() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let gateway = std::sync::Arc::new(
            MockGateway::default()
                .with_product(a, "A", 100, 5)
                .with_product(b, "B", 100, 5),
        );

        let debited = debit_stock(&gateway, &[line(a, 2), line(b, 1)]).await.unwrap();
        assert_eq!(debited, vec![(a, 2), (b, 1)]);
        assert_eq!(gateway.stock_of(a), 3);
        assert_eq!(gateway.stock_of(b), 4);
    }

    #[tokio::test]
    async fn upstream_errors_pass_through_unchanged() {
        let missing = Uuid::new_v4();
        let gateway = std::sync::Arc::new(MockGateway::default());

        let err = price_items(&gateway, &[line(missing, 1)]).await.unwrap_err();
        assert_eq!(err.code, "PRODUCT_NOT_FOUND");
        assert_eq!(err.status, 404);
    }
}
