use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{ApiKey, ApiKeyValue, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth as auth_dto,
        cart::{CartItemDto, CartList},
        items::{CategoryInfo, CategoryList, CreateItemRequest, ItemList, UpdateItemRequest},
        orders::{
            CheckoutRequest, CheckoutResponse, OrderList, OrderWithItems, PayOrderRequest,
            ShippingAddress,
        },
    },
    middleware::auth::AUTH_COOKIE,
    models::{CartItem, Order, OrderItem, ShopItem, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, health, items, orders, params, query, upload},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "cookie_auth",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(AUTH_COOKIE))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::logout,
        auth::me,
        auth::verify,
        auth::reset_request,
        auth::reset_confirm,
        items::list_items,
        items::get_item,
        items::list_categories,
        items::create_item,
        items::update_item,
        items::delete_item,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        orders::list_orders,
        orders::checkout,
        orders::pay_order,
        orders::get_order,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory,
        query::list_records,
        query::create_record,
        query::get_record,
        query::update_record,
        query::delete_record,
        upload::upload_file
    ),
    components(
        schemas(
            User,
            ShopItem,
            CartItem,
            Order,
            OrderItem,
            auth_dto::RegisterRequest,
            auth_dto::LoginRequest,
            auth_dto::LoginResponse,
            auth_dto::VerifyEmailRequest,
            auth_dto::ResetRequest,
            auth_dto::ResetConfirmRequest,
            CreateItemRequest,
            UpdateItemRequest,
            ItemList,
            CategoryInfo,
            CategoryList,
            CartItemDto,
            CartList,
            CheckoutRequest,
            CheckoutResponse,
            PayOrderRequest,
            ShippingAddress,
            OrderList,
            OrderWithItems,
            admin::UpdateOrderStatusRequest,
            admin::InventoryAdjustRequest,
            admin::LowStockQuery,
            upload::UploadResponse,
            params::Pagination,
            params::ItemQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<ShopItem>,
            ApiResponse<ItemList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<CheckoutResponse>
        )
    ),
    security(
        ("cookie_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Items", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Checkout and order endpoints"),
        (name = "Admin", description = "Admin endpoints"),
        (name = "Query", description = "Dynamic collection endpoints"),
        (name = "Upload", description = "File upload endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
