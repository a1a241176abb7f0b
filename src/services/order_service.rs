use chrono::Utc;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CheckoutRequest, CheckoutResponse, OrderList, OrderWithItems, PayOrderRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

#[derive(Debug, FromRow)]
struct CartPricingRow {
    item_id: Uuid,
    quantity: i32,
    price: i64,
    stock: i32,
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let status = query.status.filter(|s| !s.is_empty());

    let orders: Vec<Order> = sqlx::query_as(&format!(
        r#"
        SELECT * FROM orders
        WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at {}
        LIMIT $3 OFFSET $4
        "#,
        sort_order.as_sql()
    ))
    .bind(user.user_id)
    .bind(status.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM orders WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)",
    )
    .bind(user.user_id)
    .bind(status.as_deref())
    .fetch_one(&state.pool)
    .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 AND id = $2")
            .bind(user.user_id)
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
        "OK",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

/// Turn the cart into an order in one transaction: lock the item rows,
/// validate stock, snapshot prices, decrement stock and clear the cart. A
/// payment intent is created after commit so the provider call never holds
/// row locks.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    let mut tx = state.pool.begin().await?;

    let rows: Vec<CartPricingRow> = sqlx::query_as(
        r#"
        SELECT ci.item_id, ci.quantity, s.price, s.stock
        FROM cart_items ci
        JOIN shop_items s ON s.id = ci.item_id
        WHERE ci.user_id = $1 AND s.active = TRUE
        FOR UPDATE OF s
        "#,
    )
    .bind(user.user_id)
    .fetch_all(&mut *tx)
    .await?;

    if rows.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let mut total_amount: i64 = 0;
    for row in &rows {
        if row.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        if row.stock < row.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for item {}",
                row.item_id
            )));
        }
        total_amount += row.price * (row.quantity as i64);
    }

    let order_id = Uuid::new_v4();
    let invoice_number = build_invoice_number(order_id);
    let shipping_address = serde_json::to_value(&payload.shipping_address)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

    let order: Order = sqlx::query_as(
        r#"
        INSERT INTO orders
            (id, user_id, customer_name, customer_email, shipping_address,
             total_amount, status, payment_status, invoice_number)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', 'unpaid', $7)
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(user.user_id)
    .bind(payload.customer_name)
    .bind(payload.customer_email)
    .bind(shipping_address)
    .bind(total_amount)
    .bind(invoice_number)
    .fetch_one(&mut *tx)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::with_capacity(rows.len());
    for row in &rows {
        let item: OrderItem = sqlx::query_as(
            r#"
            INSERT INTO order_items (id, order_id, item_id, quantity, price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(row.item_id)
        .bind(row.quantity)
        .bind(row.price)
        .fetch_one(&mut *tx)
        .await?;
        order_items.push(item);

        sqlx::query("UPDATE shop_items SET stock = stock - $1 WHERE id = $2")
            .bind(row.quantity)
            .bind(row.item_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let (order, client_secret) = match &state.payments {
        Some(stripe) => {
            let intent = stripe
                .create_payment_intent(total_amount, "usd", &order.id.to_string())
                .await?;
            let order: Order = sqlx::query_as(
                "UPDATE orders SET payment_intent_id = $2, updated_at = now() WHERE id = $1 RETURNING *",
            )
            .bind(order.id)
            .bind(&intent.id)
            .fetch_one(&state.pool)
            .await?;
            (order, intent.client_secret)
        }
        None => (order, None),
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total": total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Checkout success",
        CheckoutResponse {
            order,
            items: order_items,
            client_secret,
        },
        Some(Meta::empty()),
    ))
}

/// Confirm payment for an order. With Stripe configured the stored intent has
/// to report `succeeded`; without it the payment is recorded directly (manual
/// settlement).
pub async fn pay_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: PayOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 AND id = $2")
            .bind(user.user_id)
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if order.payment_status == "paid" {
        return Err(AppError::BadRequest("Order already paid".into()));
    }

    if let Some(intent_id) = order.payment_intent_id.as_deref() {
        let stripe = state
            .payments
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("stripe not configured")))?;

        if let Some(claimed) = payload.payment_intent_id.as_deref() {
            if claimed != intent_id {
                return Err(AppError::BadRequest("payment intent mismatch".into()));
            }
        }

        let intent = stripe.retrieve_payment_intent(intent_id).await?;
        if intent.status != "succeeded" {
            return Err(AppError::BadRequest(format!(
                "payment not completed (status: {})",
                intent.status
            )));
        }
    }

    let order: Order = sqlx::query_as(
        r#"
        UPDATE orders
        SET payment_status = 'paid', status = 'paid', paid_at = $2, updated_at = $2
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(order.id)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await?;

    let items: Vec<OrderItem> =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1")
            .bind(order.id)
            .fetch_all(&state.pool)
            .await?;

    if let Some(mailer) = &state.mailer {
        if let Err(err) = mailer
            .send_order_confirmation(&order.customer_email, &order.invoice_number, order.total_amount)
            .await
        {
            tracing::warn!(error = %err, "order confirmation email failed");
        }
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_paid",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment recorded",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

fn build_invoice_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("INV-{date}-{short}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_number_embeds_date_and_order_prefix() {
        let id = Uuid::new_v4();
        let invoice = build_invoice_number(id);
        let expected_prefix = format!("INV-{}", Utc::now().format("%Y%m%d"));
        assert!(invoice.starts_with(&expected_prefix));
        assert!(invoice.ends_with(&id.to_string()[..8]));
    }
}
