use chrono::Utc;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::items::ItemList,
    dto::orders::{OrderList, OrderWithItems},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem, ShopItem},
    response::{ApiResponse, Meta},
    routes::admin::{InventoryAdjustRequest, LowStockQuery, UpdateOrderStatusRequest},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

pub const ORDER_STATUSES: &[&str] = &["pending", "paid", "shipped", "delivered", "cancelled"];

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let status = query.status.filter(|s| !s.is_empty());

    let orders: Vec<Order> = sqlx::query_as(&format!(
        r#"
        SELECT * FROM orders
        WHERE ($1::text IS NULL OR status = $1)
        ORDER BY created_at {}
        LIMIT $2 OFFSET $3
        "#,
        sort_order.as_sql()
    ))
    .bind(status.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1)")
            .bind(status.as_deref())
            .fetch_one(&state.pool)
            .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;

    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items: Vec<OrderItem> =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1")
            .bind(order.id)
            .fetch_all(&state.pool)
            .await?;

    Ok(ApiResponse::success(
        "Order found",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    validate_order_status(&payload.status)?;

    let order: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&payload.status)
    .bind(Utc::now())
    .fetch_optional(&state.pool)
    .await?;

    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order.status })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Status updated", order, Some(Meta::empty())))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ItemList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);

    let items: Vec<ShopItem> = sqlx::query_as(
        r#"
        SELECT * FROM shop_items
        WHERE stock <= $1
        ORDER BY stock ASC, name ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(threshold)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shop_items WHERE stock <= $1")
        .bind(threshold)
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("Low stock", ItemList { items }, Some(meta)))
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<ShopItem>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be zero".into()));
    }

    // The WHERE clause keeps stock from going negative under a concurrent
    // decrement.
    let item: Option<ShopItem> = sqlx::query_as(
        r#"
        UPDATE shop_items
        SET stock = stock + $2
        WHERE id = $1 AND stock + $2 >= 0
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.delta)
    .fetch_optional(&state.pool)
    .await?;

    let item = match item {
        Some(item) => item,
        None => {
            let exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM shop_items WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&state.pool)
                    .await?;
            return Err(match exists {
                Some(_) => AppError::BadRequest("stock cannot go negative".into()),
                None => AppError::NotFound,
            });
        }
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "inventory_adjust",
        Some("shop_items"),
        Some(serde_json::json!({ "item_id": item.id, "delta": payload.delta })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Inventory adjusted", item, Some(Meta::empty())))
}

fn validate_order_status(status: &str) -> AppResult<()> {
    if !ORDER_STATUSES.contains(&status) {
        return Err(AppError::BadRequest(format!(
            "invalid status {status:?}, expected one of {ORDER_STATUSES:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_known_statuses_pass_validation() {
        for status in ORDER_STATUSES {
            assert!(validate_order_status(status).is_ok());
        }
        assert!(validate_order_status("teleported").is_err());
        assert!(validate_order_status("").is_err());
    }
}
