use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        addresses::AddressList,
        cart::{CartLineDto, CartList},
        orders::{OrderDetail, OrderList},
        payments::{CreateIntentRequest, CreateIntentResponse},
        products::{ProductList, ProductWithVariants},
        reviews::ReviewList,
    },
    models::{
        CartItem, Order, OrderItem, Payment, Product, ProductVariant, Review, User, UserAddress,
    },
    response::{ApiResponse, Meta},
    routes::{addresses, admin, auth, cart, health, orders, params, payments, products, reviews},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::create_variant,
        products::update_variant,
        products::delete_variant,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        orders::cancel_order,
        addresses::list_addresses,
        addresses::create_address,
        addresses::update_address,
        addresses::delete_address,
        reviews::list_reviews,
        reviews::create_review,
        payments::create_intent,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::delete_order,
        admin::list_low_stock
    ),
    components(
        schemas(
            User,
            Product,
            ProductVariant,
            CartItem,
            Order,
            OrderItem,
            Payment,
            UserAddress,
            Review,
            ProductList,
            ProductWithVariants,
            CartList,
            CartLineDto,
            OrderList,
            OrderDetail,
            AddressList,
            ReviewList,
            CreateIntentRequest,
            CreateIntentResponse,
            health::HealthData,
            admin::UpdateOrderStatusRequest,
            admin::LowStockQuery,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductWithVariants>,
            ApiResponse<OrderDetail>,
            ApiResponse<OrderList>,
            ApiResponse<ProductList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Addresses", description = "Saved address endpoints"),
        (name = "Reviews", description = "Product review endpoints"),
        (name = "Payments", description = "Payment relay endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
