use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartItemDto, CartList},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, ShopItem},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

#[derive(FromRow)]
struct CartWithItemRow {
    cart_id: Uuid,
    quantity: i32,
    item_id: Uuid,
    name: String,
    description: Option<String>,
    price: i64,
    category: String,
    stock: i32,
    active: bool,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

pub async fn list_cart(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let rows = sqlx::query_as::<_, CartWithItemRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity,
               s.id AS item_id, s.name, s.description, s.price, s.category,
               s.stock, s.active, s.image_url, s.created_at
        FROM cart_items ci
        JOIN shop_items s ON s.id = ci.item_id
        WHERE ci.user_id = $1
        ORDER BY ci.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(&state.pool)
        .await?;

    let items = rows
        .into_iter()
        .map(|row| CartItemDto {
            id: row.cart_id,
            item: ShopItem {
                id: row.item_id,
                name: row.name,
                description: row.description,
                price: row.price,
                category: row.category,
                stock: row.stock,
                active: row.active,
                image_url: row.image_url,
                created_at: row.created_at,
            },
            quantity: row.quantity,
        })
        .collect();

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", CartList { items }, Some(meta)))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let item: Option<(bool,)> = sqlx::query_as("SELECT active FROM shop_items WHERE id = $1")
        .bind(payload.item_id)
        .fetch_optional(&state.pool)
        .await?;
    match item {
        None => return Err(AppError::BadRequest("item not found".to_string())),
        Some((active,)) if !active => {
            return Err(AppError::BadRequest("item is not available".to_string()));
        }
        Some(_) => {}
    }

    let exist: Option<CartItem> =
        sqlx::query_as("SELECT * FROM cart_items WHERE user_id = $1 AND item_id = $2")
            .bind(user.user_id)
            .bind(payload.item_id)
            .fetch_optional(&state.pool)
            .await?;

    let cart_item = if let Some(item) = exist {
        sqlx::query_as::<_, CartItem>(
            r#"
            UPDATE cart_items
            SET quantity = $3
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(user.user_id)
        .bind(payload.quantity)
        .fetch_one(&state.pool)
        .await?
    } else {
        sqlx::query_as(
            "INSERT INTO cart_items (user_id, item_id, quantity) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(user.user_id)
        .bind(payload.item_id)
        .bind(payload.quantity)
        .fetch_one(&state.pool)
        .await?
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": payload.item_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", cart_item, None))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM cart_items WHERE item_id = $1 AND user_id = $2")
        .bind(item_id)
        .bind(user.user_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
