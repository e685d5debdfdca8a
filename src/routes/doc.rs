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
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{
            AddToCartRequest, CartDto, CartItemDto, CartProduct, MergeCartLine, MergeCartRequest,
            UpdateCartItemRequest,
        },
        collections::{
            CollectionList, CollectionWithProducts, CreateCollectionRequest,
            UpdateCollectionRequest,
        },
        inventory::{InventoryFilter, InventoryList, InventoryRow},
        orders::{CreateOrderRequest, OrderLineInput, OrderList, UpdateOrderRequest},
        payments::{ConfirmPaymentRequest, ConfirmPaymentResponse},
        products::{CreateProductRequest, ImageInput, ProductList, UpdateProductRequest, VariantInput},
    },
    models::{
        Collection, Order, OrderItem, OrderStatus, Payment, PaymentMethod, PaymentStatus, Product,
        ProductImage, ProductStatus, ProductVariant, ShippingAddress, User,
    },
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, cart, collections, health, orders, params, payments,
        products as product_routes,
    },
    stock::StockStatus,
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
        auth::register,
        auth::login,
        product_routes::list_products,
        product_routes::get_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        collections::list_collections,
        collections::get_collection,
        collections::create_collection,
        collections::update_collection,
        collections::delete_collection,
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        cart::merge_cart,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::update_order,
        payments::confirm_payment,
        admin::list_all_orders,
        admin::inventory
    ),
    components(
        schemas(
            User,
            Product,
            ProductImage,
            ProductVariant,
            ProductStatus,
            Collection,
            ShippingAddress,
            Order,
            OrderItem,
            OrderStatus,
            Payment,
            PaymentStatus,
            PaymentMethod,
            StockStatus,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            ImageInput,
            VariantInput,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CreateCollectionRequest,
            UpdateCollectionRequest,
            CollectionList,
            CollectionWithProducts,
            AddToCartRequest,
            UpdateCartItemRequest,
            MergeCartLine,
            MergeCartRequest,
            CartProduct,
            CartItemDto,
            CartDto,
            OrderLineInput,
            CreateOrderRequest,
            UpdateOrderRequest,
            OrderList,
            ConfirmPaymentRequest,
            ConfirmPaymentResponse,
            InventoryFilter,
            InventoryRow,
            InventoryList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::InventoryQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartDto>,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<InventoryList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Collections", description = "Collection endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Payments", description = "Payment confirmation endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
