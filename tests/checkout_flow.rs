use arcana_shop_api::{
    dto::cart::AddToCartRequest,
    dto::orders::{CheckoutRequest, PayOrderRequest, ShippingAddress},
    middleware::auth::AuthUser,
    routes::admin::{LowStockQuery, UpdateOrderStatusRequest},
    routes::params::Pagination,
    services::{admin_service, cart_service, order_service},
    state::AppState,
};
use uuid::Uuid;

mod common;

// Integration flow: user adds to cart -> checkout -> pay; admin updates status
// and sees the item in the low-stock list.
#[tokio::test]
async fn checkout_pay_and_admin_low_stock_flow() -> anyhow::Result<()> {
    let Some(db) = common::setup_state().await? else {
        return Ok(());
    };
    let state = db.state.clone();

    let user_id = create_user(&state, "user", "reader@arcana.example").await?;
    let admin_id = create_user(&state, "admin", "admin@arcana.example").await?;

    let item_id = create_item(&state, "Rider-Waite Tarot Deck", 1000, 10).await?;

    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    // Add to cart
    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            item_id,
            quantity: 2,
        },
    )
    .await?;

    // Checkout
    let checkout_resp = order_service::checkout(
        &state,
        &auth_user,
        CheckoutRequest {
            customer_name: "A Reader".into(),
            customer_email: "reader@arcana.example".into(),
            shipping_address: ShippingAddress {
                line1: "12 Moon Street".into(),
                line2: None,
                city: "Prague".into(),
                postal_code: "11000".into(),
                country: "CZ".into(),
            },
        },
    )
    .await?;
    let checkout = checkout_resp.data.unwrap();
    assert_eq!(checkout.order.total_amount, 2000);
    assert_eq!(checkout.order.payment_status, "unpaid");
    // No Stripe key in tests, so there is nothing for the client to confirm.
    assert!(checkout.client_secret.is_none());

    // Cart is cleared by checkout
    let cart = cart_service::list_cart(
        &state,
        &auth_user,
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?;
    assert!(cart.data.unwrap().items.is_empty());

    // Pay (manual settlement without Stripe)
    let pay_resp = order_service::pay_order(
        &state,
        &auth_user,
        checkout.order.id,
        PayOrderRequest::default(),
    )
    .await?;
    let paid_order = pay_resp.data.unwrap().order;
    assert_eq!(paid_order.status, "paid");
    assert!(paid_order.paid_at.is_some());

    // Paying twice is rejected
    let second = order_service::pay_order(
        &state,
        &auth_user,
        checkout.order.id,
        PayOrderRequest::default(),
    )
    .await;
    assert!(second.is_err());

    // Admin updates status
    let updated = admin_service::update_order_status(
        &state,
        &auth_admin,
        checkout.order.id,
        UpdateOrderStatusRequest {
            status: "shipped".into(),
        },
    )
    .await?;
    assert_eq!(updated.data.unwrap().status, "shipped");

    // A non-admin cannot touch the admin surface
    let forbidden = admin_service::update_order_status(
        &state,
        &auth_user,
        checkout.order.id,
        UpdateOrderStatusRequest {
            status: "delivered".into(),
        },
    )
    .await;
    assert!(forbidden.is_err());

    // Low stock includes the item after stock dropped to 8
    let low = admin_service::list_low_stock(
        &state,
        &auth_admin,
        LowStockQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            threshold: Some(10),
        },
    )
    .await?;
    assert!(
        low.data.unwrap().items.iter().any(|i| i.id == item_id),
        "expected item to appear in low-stock list"
    );

    Ok(())
}

#[tokio::test]
async fn checkout_rejects_empty_cart_and_excess_quantity() -> anyhow::Result<()> {
    let Some(db) = common::setup_state().await? else {
        return Ok(());
    };
    let state = db.state.clone();

    let user_id = create_user(&state, "user", "empty@arcana.example").await?;
    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };

    let address = ShippingAddress {
        line1: "1 Nowhere".into(),
        line2: None,
        city: "Brno".into(),
        postal_code: "60200".into(),
        country: "CZ".into(),
    };

    let empty = order_service::checkout(
        &state,
        &auth_user,
        CheckoutRequest {
            customer_name: "Nobody".into(),
            customer_email: "empty@arcana.example".into(),
            shipping_address: address,
        },
    )
    .await;
    assert!(empty.is_err(), "empty cart must not check out");

    // Quantity above stock fails at checkout, not silently
    let item_id = create_item(&state, "Silk Reading Cloth", 2400, 1).await?;
    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            item_id,
            quantity: 3,
        },
    )
    .await?;

    let over = order_service::checkout(
        &state,
        &auth_user,
        CheckoutRequest {
            customer_name: "Nobody".into(),
            customer_email: "empty@arcana.example".into(),
            shipping_address: ShippingAddress {
                line1: "1 Nowhere".into(),
                line2: None,
                city: "Brno".into(),
                postal_code: "60200".into(),
                country: "CZ".into(),
            },
        },
    )
    .await;
    assert!(over.is_err(), "insufficient stock must fail checkout");

    Ok(())
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, 'dummy', $3)")
        .bind(id)
        .bind(email)
        .bind(role)
        .execute(&state.pool)
        .await?;
    Ok(id)
}

async fn create_item(
    state: &AppState,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO shop_items (id, name, description, price, category, stock)
        VALUES ($1, $2, 'test item', $3, 'decks', $4)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(price)
    .bind(stock)
    .execute(&state.pool)
    .await?;
    Ok(id)
}
