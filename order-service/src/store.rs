//! Relational persistence for orders and their items.
//!
//! Every function takes an open connection so callers can compose several
//! operations inside one transaction; `get_for_update` is the row lock that
//! serializes confirm/cancel against each other.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::models::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, PricedItem, ShippingAddress};
use crate::schema::{order_items, orders};

pub async fn create_order(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    total_amount: i32,
    status: OrderStatus,
    shipping: Option<&ShippingAddress>,
) -> QueryResult<Order> {
    create_order_with_id(conn, Uuid::new_v4(), user_id, total_amount, status, shipping).await
}

/// Insert with a caller-chosen id. The async worker uses this so the id
/// handed to the client at placement time is the id that lands in the table.
pub async fn create_order_with_id(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    user_id: Uuid,
    total_amount: i32,
    status: OrderStatus,
    shipping: Option<&ShippingAddress>,
) -> QueryResult<Order> {
    let new_order = NewOrder {
        id,
        user_id,
        status: status.as_str().to_string(),
        total_amount,
        recipient_name: shipping.map(|s| s.recipient_name.clone()),
        phone: shipping.map(|s| s.phone.clone()),
        address: shipping.map(|s| s.address.clone()),
        address_detail: shipping.and_then(|s| s.address_detail.clone()),
        postal_code: shipping.map(|s| s.postal_code.clone()),
    };

    diesel::insert_into(orders::table)
        .values(&new_order)
        .get_result(conn)
        .await
}

pub async fn create_item(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
    item: &PricedItem,
) -> QueryResult<OrderItem> {
    let new_item = NewOrderItem {
        id: Uuid::new_v4(),
        order_id,
        product_id: item.product_id,
        deal_id: item.deal_id,
        product_name: item.product_name.clone(),
        quantity: item.quantity,
        unit_price: item.unit_price,
        subtotal: item.subtotal(),
    };

    diesel::insert_into(order_items::table)
        .values(&new_item)
        .get_result(conn)
        .await
}

pub async fn get(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Option<Order>> {
    orders::table
        .filter(orders::id.eq(id))
        .first::<Order>(conn)
        .await
        .optional()
}

/// `SELECT ... FOR UPDATE`; must run inside a transaction, the lock is held
/// until that transaction ends.
pub async fn get_for_update(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Option<Order>> {
    orders::table
        .filter(orders::id.eq(id))
        .for_update()
        .first::<Order>(conn)
        .await
        .optional()
}

/// Precondition (status = pending, ownership) is the caller's job, checked
/// under the `get_for_update` lock in the same transaction.
pub async fn confirm(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Order> {
    diesel::update(orders::table.filter(orders::id.eq(id)))
        .set((
            orders::status.eq(OrderStatus::Confirmed.as_str()),
            orders::updated_at.eq(Utc::now()),
        ))
        .get_result(conn)
        .await
}

pub async fn cancel(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    reason: Option<&str>,
) -> QueryResult<Order> {
    let now = Utc::now();
    diesel::update(orders::table.filter(orders::id.eq(id)))
        .set((
            orders::status.eq(OrderStatus::Cancelled.as_str()),
            orders::cancelled_at.eq(Some(now)),
            orders::cancel_reason.eq(reason),
            orders::updated_at.eq(now),
        ))
        .get_result(conn)
        .await
}

pub async fn list_items(conn: &mut AsyncPgConnection, order_id: Uuid) -> QueryResult<Vec<OrderItem>> {
    order_items::table
        .filter(order_items::order_id.eq(order_id))
        .order(order_items::created_at.asc())
        .load::<OrderItem>(conn)
        .await
}

pub async fn list_by_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    limit: i64,
    offset: i64,
    status: Option<OrderStatus>,
) -> QueryResult<Vec<Order>> {
    match status {
        Some(status) => {
            orders::table
                .filter(orders::user_id.eq(user_id))
                .filter(orders::status.eq(status.as_str()))
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load::<Order>(conn)
                .await
        }
        None => {
            orders::table
                .filter(orders::user_id.eq(user_id))
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load::<Order>(conn)
                .await
        }
    }
}

pub async fn count_by_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    status: Option<OrderStatus>,
) -> QueryResult<i64> {
    match status {
        Some(status) => {
            orders::table
                .filter(orders::user_id.eq(user_id))
                .filter(orders::status.eq(status.as_str()))
                .count()
                .get_result(conn)
                .await
        }
        None => {
            orders::table
                .filter(orders::user_id.eq(user_id))
                .count()
                .get_result(conn)
                .await
        }
    }
}
