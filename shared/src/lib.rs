//! Wire contract between the order service and the product (stock) service.
//!
//! Message types are hand-written prost derives (standard protobuf wire
//! format); the `ProductService` client/server glue is generated by
//! tonic-build's manual builder in `build.rs`.

pub mod proto;
