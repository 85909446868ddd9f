//! Stock RPC messages and generated service glue.
//!
//! Three verbs: `GetProduct`, `GetDeal` (with the product embedded) and
//! `UpdateStock` (signed delta; negative decrements, positive restores).

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetProductRequest {
    #[prost(string, tag = "1")]
    pub product_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetDealRequest {
    #[prost(string, tag = "1")]
    pub deal_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateStockRequest {
    #[prost(string, tag = "1")]
    pub product_id: String,
    /// Signed stock delta. The server rejects any delta that would take the
    /// counter below zero with FAILED_PRECONDITION.
    #[prost(int32, tag = "2")]
    pub delta: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Product {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub description: String,
    /// Unit price in minor currency units.
    #[prost(int32, tag = "4")]
    pub price: i32,
    #[prost(int32, tag = "5")]
    pub stock: i32,
    #[prost(string, tag = "6")]
    pub created_at: String,
    #[prost(string, tag = "7")]
    pub updated_at: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Deal {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub product_id: String,
    #[prost(int32, tag = "3")]
    pub deal_price: i32,
    #[prost(int32, tag = "4")]
    pub stock_limit: i32,
    #[prost(string, tag = "5")]
    pub start_time: String,
    #[prost(string, tag = "6")]
    pub end_time: String,
    /// Derived server-side: "scheduled" | "active" | "ended" | "sold_out".
    #[prost(string, tag = "7")]
    pub status: String,
    #[prost(message, optional, tag = "8")]
    pub product: Option<Product>,
}

include!(concat!(env!("OUT_DIR"), "/flashsale.product.ProductService.rs"));

pub use product_service_client::ProductServiceClient;
pub use product_service_server::{ProductService, ProductServiceServer};
