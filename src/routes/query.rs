use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{slug}", get(list_records).post(create_record))
        .route(
            "/{slug}/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
}

#[utoipa::path(
    get,
    path = "/api/query/{slug}",
    params(
        ("slug" = String, Path, description = "Collection slug"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "List records in a dynamic collection"),
        (status = 400, description = "Invalid slug"),
        (status = 403, description = "Forbidden or reserved collection"),
        (status = 404, description = "Collection does not exist"),
    ),
    security(("cookie_auth" = [])),
    tag = "Query"
)]
pub async fn list_records(
    State(state): State<AppState>,
    user: AuthUser,
    Path(slug): Path<String>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<Vec<serde_json::Value>>>> {
    ensure_admin(&user)?;
    let (page, limit, offset) = pagination.normalize();
    let (records, total) = state.store.list(&slug, limit, offset).await?;
    let meta = Meta::new(page, limit, total);
    Ok(Json(ApiResponse::success("OK", records, Some(meta))))
}

#[utoipa::path(
    post,
    path = "/api/query/{slug}",
    params(
        ("slug" = String, Path, description = "Collection slug")
    ),
    responses(
        (status = 200, description = "Insert a record, creating table/columns on first write"),
        (status = 400, description = "Invalid slug or payload"),
        (status = 403, description = "Forbidden or reserved collection"),
    ),
    security(("cookie_auth" = [])),
    tag = "Query"
)]
pub async fn create_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path(slug): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    ensure_admin(&user)?;
    let record = state.store.insert(&slug, payload).await?;
    Ok(Json(ApiResponse::success("Created", record, Some(Meta::empty()))))
}

#[utoipa::path(
    get,
    path = "/api/query/{slug}/{id}",
    params(
        ("slug" = String, Path, description = "Collection slug"),
        ("id" = Uuid, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Fetch one record"),
        (status = 404, description = "Not Found"),
    ),
    security(("cookie_auth" = [])),
    tag = "Query"
)]
pub async fn get_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path((slug, id)): Path<(String, Uuid)>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    ensure_admin(&user)?;
    let record = state.store.get(&slug, id).await?;
    Ok(Json(ApiResponse::success("OK", record, None)))
}

#[utoipa::path(
    put,
    path = "/api/query/{slug}/{id}",
    params(
        ("slug" = String, Path, description = "Collection slug"),
        ("id" = Uuid, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Update a record"),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Not Found"),
    ),
    security(("cookie_auth" = [])),
    tag = "Query"
)]
pub async fn update_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path((slug, id)): Path<(String, Uuid)>,
    Json(payload): Json<serde_json::Value>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    ensure_admin(&user)?;
    let record = state.store.update(&slug, id, payload).await?;
    Ok(Json(ApiResponse::success("Updated", record, Some(Meta::empty()))))
}

#[utoipa::path(
    delete,
    path = "/api/query/{slug}/{id}",
    params(
        ("slug" = String, Path, description = "Collection slug"),
        ("id" = Uuid, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Delete a record"),
        (status = 404, description = "Not Found"),
    ),
    security(("cookie_auth" = [])),
    tag = "Query"
)]
pub async fn delete_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path((slug, id)): Path<(String, Uuid)>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    ensure_admin(&user)?;
    state.store.delete(&slug, id).await?;
    Ok(Json(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}
