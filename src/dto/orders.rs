use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Order, OrderItem};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Present when Stripe is configured; the client confirms the intent with it.
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct PayOrderRequest {
    /// Required when the order was checked out with a Stripe payment intent.
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
