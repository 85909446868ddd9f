diesel::table! {
    orders (id) {
        id -> Uuid,
        user_id -> Uuid,
        status -> Varchar,
        total_amount -> Int4,
        recipient_name -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        address -> Nullable<Varchar>,
        address_detail -> Nullable<Varchar>,
        postal_code -> Nullable<Varchar>,
        cancelled_at -> Nullable<Timestamptz>,
        cancel_reason -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    order_items (id) {
        id -> Uuid,
        order_id -> Uuid,
        product_id -> Uuid,
        deal_id -> Nullable<Uuid>,
        product_name -> Varchar,
        quantity -> Int4,
        unit_price -> Int4,
        subtotal -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(order_items -> orders (order_id));

diesel::allow_tables_to_appear_in_same_query!(
    order_items,
    orders,
);
