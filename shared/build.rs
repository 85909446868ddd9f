use tonic_build::manual::{Builder, Method, Service};

fn main() {
    let product_service = Service::builder()
        .name("ProductService")
        .package("flashsale.product")
        .method(
            Method::builder()
                .name("get_product")
                .route_name("GetProduct")
                .input_type("crate::proto::GetProductRequest")
                .output_type("crate::proto::Product")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .method(
            Method::builder()
                .name("get_deal")
                .route_name("GetDeal")
                .input_type("crate::proto::GetDealRequest")
                .output_type("crate::proto::Deal")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .method(
            Method::builder()
                .name("update_stock")
                .route_name("UpdateStock")
                .input_type("crate::proto::UpdateStockRequest")
                .output_type("crate::proto::Product")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .build();

    Builder::new().compile(&[product_service]);
}
