//! Minimal Stripe client over the REST API.
//!
//! Calls `api.stripe.com` directly with reqwest rather than pulling in a full
//! SDK; only the payment-intent surface used by checkout is covered.

use serde::Deserialize;
use thiserror::Error;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("stripe request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stripe rejected the request: {0}")]
    Api(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    /// One of `requires_payment_method`, `processing`, `succeeded`, etc.
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.into(),
        }
    }

    pub async fn create_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        order_id: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        let params = [
            ("amount", amount_cents.to_string()),
            ("currency", currency.to_string()),
            ("metadata[order_id]", order_id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .http
            .post(format!("{STRIPE_API_BASE}/payment_intents"))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await?;

        Self::parse(response).await
    }

    pub async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .http
            .get(format!("{STRIPE_API_BASE}/payment_intents/{intent_id}"))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;

        Self::parse(response).await
    }

    async fn parse(response: reqwest::Response) -> Result<PaymentIntent, PaymentError> {
        if response.status().is_success() {
            Ok(response.json::<PaymentIntent>().await?)
        } else {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| "unknown error".to_string());
            Err(PaymentError::Api(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_intent_deserializes_stripe_shape() {
        let raw = r#"{
            "id": "pi_123",
            "object": "payment_intent",
            "client_secret": "pi_123_secret_456",
            "amount": 2500,
            "currency": "usd",
            "status": "requires_payment_method"
        }"#;
        let intent: PaymentIntent = serde_json::from_str(raw).unwrap();
        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.amount, 2500);
        assert_eq!(intent.status, "requires_payment_method");
    }

    #[test]
    fn error_body_surfaces_message() {
        let raw = r#"{"error": {"type": "invalid_request_error", "message": "No such payment_intent"}}"#;
        let body: StripeErrorBody = serde_json::from_str(raw).unwrap();
        assert_eq!(
            body.error.message.as_deref(),
            Some("No such payment_intent")
        );
    }
}
