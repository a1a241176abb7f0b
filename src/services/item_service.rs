use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::items::{CategoryInfo, CategoryList, CreateItemRequest, ItemList, UpdateItemRequest},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::ShopItem,
    response::{ApiResponse, Meta},
    routes::params::{ItemQuery, ItemSortBy, SortOrder},
    state::AppState,
};

pub async fn list_items(
    state: &AppState,
    viewer: Option<&AuthUser>,
    query: ItemQuery,
) -> AppResult<ApiResponse<ItemList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let is_admin = viewer.is_some_and(|u| u.role == "admin");
    let show_inactive = is_admin && query.include_inactive.unwrap_or(false);

    let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM shop_items WHERE 1=1");
    let mut count_builder =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM shop_items WHERE 1=1");

    for qb in [&mut builder, &mut count_builder] {
        if !show_inactive {
            qb.push(" AND active = TRUE");
        }
        if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{search}%");
            qb.push(" AND (name ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR description ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
        if let Some(category) = query.category.as_ref().filter(|s| !s.is_empty()) {
            qb.push(" AND category = ");
            qb.push_bind(category.clone());
        }
        if let Some(min_price) = query.min_price {
            qb.push(" AND price >= ");
            qb.push_bind(min_price);
        }
        if let Some(max_price) = query.max_price {
            qb.push(" AND price <= ");
            qb.push_bind(max_price);
        }
    }

    let sort_by = query.sort_by.unwrap_or(ItemSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    builder.push(format!(
        " ORDER BY {} {} LIMIT ",
        sort_by.as_sql(),
        sort_order.as_sql()
    ));
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let items: Vec<ShopItem> = builder
        .build_query_as()
        .fetch_all(&state.pool)
        .await?;
    let total: (i64,) = count_builder
        .build_query_as()
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("Items", ItemList { items }, Some(meta)))
}

pub async fn get_item(
    state: &AppState,
    viewer: Option<&AuthUser>,
    id: Uuid,
) -> AppResult<ApiResponse<ShopItem>> {
    let item: Option<ShopItem> = sqlx::query_as("SELECT * FROM shop_items WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;

    let is_admin = viewer.is_some_and(|u| u.role == "admin");
    match item {
        Some(item) if item.active || is_admin => Ok(ApiResponse::success("Item", item, None)),
        _ => Err(AppError::NotFound),
    }
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items: Vec<CategoryInfo> = sqlx::query_as(
        r#"
        SELECT category AS name, COUNT(*) AS count
        FROM shop_items
        WHERE active = TRUE
        GROUP BY category
        ORDER BY category
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_item(
    state: &AppState,
    user: &AuthUser,
    payload: CreateItemRequest,
) -> AppResult<ApiResponse<ShopItem>> {
    ensure_admin(user)?;
    validate_price_and_stock(payload.price, payload.stock)?;

    let id = Uuid::new_v4();
    let item: ShopItem = sqlx::query_as(
        r#"
        INSERT INTO shop_items (id, name, description, price, category, stock, active, image_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.name)
    .bind(payload.description)
    .bind(payload.price)
    .bind(payload.category)
    .bind(payload.stock)
    .bind(payload.active)
    .bind(payload.image_url)
    .fetch_one(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "item_create",
        Some("shop_items"),
        Some(serde_json::json!({ "item_id": item.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Item created", item, Some(Meta::empty())))
}

pub async fn update_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateItemRequest,
) -> AppResult<ApiResponse<ShopItem>> {
    ensure_admin(user)?;

    let existing: Option<ShopItem> = sqlx::query_as("SELECT * FROM shop_items WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = match existing {
        Some(item) => item,
        None => return Err(AppError::NotFound),
    };

    let name = payload.name.unwrap_or(existing.name);
    // An explicit null clears the column; an absent field keeps it.
    let description = payload.description.unwrap_or(existing.description);
    let price = payload.price.unwrap_or(existing.price);
    let category = payload.category.unwrap_or(existing.category);
    let stock = payload.stock.unwrap_or(existing.stock);
    let active = payload.active.unwrap_or(existing.active);
    let image_url = payload.image_url.unwrap_or(existing.image_url);

    validate_price_and_stock(price, stock)?;

    let item: ShopItem = sqlx::query_as(
        r#"
        UPDATE shop_items
        SET name = $2, description = $3, price = $4, category = $5,
            stock = $6, active = $7, image_url = $8
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(price)
    .bind(category)
    .bind(stock)
    .bind(active)
    .bind(image_url)
    .fetch_one(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "item_update",
        Some("shop_items"),
        Some(serde_json::json!({ "item_id": item.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Updated", item, Some(Meta::empty())))
}

pub async fn delete_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let result = sqlx::query("DELETE FROM shop_items WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "item_delete",
        Some("shop_items"),
        Some(serde_json::json!({ "item_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn validate_price_and_stock(price: i64, stock: i32) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    Ok(())
}
