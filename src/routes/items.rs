use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::items::{CategoryList, CreateItemRequest, ItemList, UpdateItemRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::ShopItem,
    response::ApiResponse,
    routes::params::ItemQuery,
    services::item_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route(
            "/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
}

#[utoipa::path(
    get,
    path = "/api/items",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("q" = Option<String>, Query, description = "Search over name and description"),
        ("category" = Option<String>, Query, description = "Filter by category"),
        ("min_price" = Option<i64>, Query, description = "Minimum price in cents"),
        ("max_price" = Option<i64>, Query, description = "Maximum price in cents"),
        ("sort_by" = Option<String>, Query, description = "created_at, price or name"),
        ("sort_order" = Option<String>, Query, description = "asc or desc"),
        ("include_inactive" = Option<bool>, Query, description = "Admin only")
    ),
    responses(
        (status = 200, description = "List shop items", body = ApiResponse<ItemList>)
    ),
    tag = "Items"
)]
pub async fn list_items(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    Query(query): Query<ItemQuery>,
) -> AppResult<Json<ApiResponse<ItemList>>> {
    let resp = item_service::list_items(&state, viewer.as_ref(), query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/items/{id}",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Get item", body = ApiResponse<ShopItem>),
        (status = 404, description = "Item not found or inactive"),
    ),
    tag = "Items"
)]
pub async fn get_item(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ShopItem>>> {
    let resp = item_service::get_item(&state, viewer.as_ref(), id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/categories",
    responses(
        (status = 200, description = "Distinct categories of active items", body = ApiResponse<CategoryList>)
    ),
    tag = "Items"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<CategoryList>>> {
    let resp = item_service::list_categories(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/items",
    request_body = CreateItemRequest,
    responses(
        (status = 200, description = "Create item", body = ApiResponse<ShopItem>),
        (status = 403, description = "Forbidden")
    ),
    security(("cookie_auth" = [])),
    tag = "Items"
)]
pub async fn create_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateItemRequest>,
) -> AppResult<Json<ApiResponse<ShopItem>>> {
    let resp = item_service::create_item(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/items/{id}",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Updated item", body = ApiResponse<ShopItem>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("cookie_auth" = [])),
    tag = "Items"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateItemRequest>,
) -> AppResult<Json<ApiResponse<ShopItem>>> {
    let resp = item_service::update_item(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/items/{id}",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Deleted item"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("cookie_auth" = [])),
    tag = "Items"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = item_service::delete_item(&state, &user, id).await?;
    Ok(Json(resp))
}
