use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{OrderStatus, ShippingAddress};
use crate::product_client::GrpcProductGateway;
use crate::service::{OrderItemRequest, OrderResponse, OrderService, ServiceError};

const USER_ID_HEADER: &str = "x-user-id";
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService<GrpcProductGateway>>,
    pub async_orders: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderItemRequest {
    pub product_id: String,
    #[serde(default)]
    pub deal_id: Option<String>,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<CreateOrderItemRequest>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub items: Vec<OrderResponse>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(ErrorResponse {
            error: self.code,
            message: self.message,
        });
        (status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/confirm", post(confirm_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "order-service",
    }))
}

async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    let user_id = authenticated_user(&headers)?;

    if request.items.is_empty() {
        return Err(ServiceError::invalid_request("at least one item is required"));
    }

    let mut items = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let product_id = Uuid::parse_str(&item.product_id).map_err(|_| {
            ServiceError::new("INVALID_PRODUCT_ID", "invalid product ID format", 400)
        })?;
        let deal_id = match &item.deal_id {
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                ServiceError::new("INVALID_DEAL_ID", "invalid deal ID format", 400)
            })?),
            None => None,
        };
        items.push(OrderItemRequest {
            product_id,
            deal_id,
            quantity: item.quantity,
        });
    }

    if state.async_orders {
        let order = state
            .service
            .create_order_async(user_id, items, request.shipping_address)
            .await?;
        Ok((StatusCode::ACCEPTED, Json(order)).into_response())
    } else {
        let order = state
            .service
            .create_order(user_id, items, request.shipping_address)
            .await?;
        Ok((StatusCode::CREATED, Json(order)).into_response())
    }
}

async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let user_id = authenticated_user(&headers)?;
    let order_id = parse_order_id(&id)?;

    let order = state.service.get_order(order_id, user_id).await?;
    Ok(Json(order))
}

async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ServiceError> {
    let user_id = authenticated_user(&headers)?;
    let (page, size) = normalize_paging(query.page, query.size);

    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(OrderStatus::parse(raw).ok_or_else(|| {
            ServiceError::invalid_request(format!("unknown status filter: {raw}"))
        })?),
    };

    let (items, total) = state.service.list_orders(user_id, page, size, status).await?;
    Ok(Json(OrderListResponse {
        items,
        total,
        page,
        size,
    }))
}

async fn confirm_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let user_id = authenticated_user(&headers)?;
    let order_id = parse_order_id(&id)?;

    let order = state.service.confirm_order(order_id, user_id).await?;
    Ok(Json(order))
}

async fn cancel_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    request: Option<Json<CancelOrderRequest>>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let user_id = authenticated_user(&headers)?;
    let order_id = parse_order_id(&id)?;
    let reason = request.and_then(|Json(body)| body.reason);

    let order = state.service.cancel_order(order_id, user_id, reason).await?;
    Ok(Json(order))
}

/// The gateway authenticates and forwards the caller as an opaque header;
/// the id itself is meaningless here beyond ownership comparison.
fn authenticated_user(headers: &HeaderMap) -> Result<Uuid, ServiceError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ServiceError::new("UNAUTHORIZED", "X-User-ID header required", 401))?;

    Uuid::parse_str(raw)
        .map_err(|_| ServiceError::new("INVALID_USER_ID", "invalid user ID format", 400))
}

fn parse_order_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw)
        .map_err(|_| ServiceError::new("INVALID_ORDER_ID", "invalid order ID format", 400))
}

/// Out-of-range values fall back to the defaults rather than erroring.
fn normalize_paging(page: Option<i64>, size: Option<i64>) -> (i64, i64) {
    let page = page.filter(|p| *p >= 1).unwrap_or(1);
    let size = size
        .filter(|s| (1..=MAX_PAGE_SIZE).contains(s))
        .unwrap_or(DEFAULT_PAGE_SIZE);
    (page, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_and_bounds() {
        assert_eq!(normalize_paging(None, None), (1, 20));
        assert_eq!(normalize_paging(Some(3), Some(50)), (3, 50));
        assert_eq!(normalize_paging(Some(0), Some(0)), (1, 20));
        assert_eq!(normalize_paging(Some(-1), Some(101)), (1, 20));
        assert_eq!(normalize_paging(Some(1), Some(100)), (1, 100));
    }

    #[test]
    fn user_header_is_required_and_validated() {
        let mut headers = HeaderMap::new();
        let err = authenticated_user(&headers).unwrap_err();
        assert_eq!(err.code, "UNAUTHORIZED");
        assert_eq!(err.status, 401);

        headers.insert(USER_ID_HEADER, "not-a-uuid".parse().unwrap());
        let err = authenticated_user(&headers).unwrap_err();
        assert_eq!(err.code, "INVALID_USER_ID");
        assert_eq!(err.status, 400);

        let user = Uuid::new_v4();
        headers.insert(USER_ID_HEADER, user.to_string().parse().unwrap());
        assert_eq!(authenticated_user(&headers).unwrap(), user);
    }

    #[test]
    fn order_id_parse_errors_use_the_order_code() {
        let err = parse_order_id("nope").unwrap_err();
        assert_eq!(err.code, "INVALID_ORDER_ID");
        assert!(parse_order_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
