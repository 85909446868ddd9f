diesel::table! {
    products (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        price -> Int4,
        stock -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    deals (id) {
        id -> Uuid,
        product_id -> Uuid,
        deal_price -> Int4,
        deal_stock -> Int4,
        remaining_stock -> Int4,
        starts_at -> Timestamptz,
        ends_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(deals -> products (product_id));

diesel::allow_tables_to_appear_in_same_query!(
    deals,
    products,
);
