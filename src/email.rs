//! Transactional email over SMTP via lettre.
//!
//! The relay is optional: when `SMTP_HOST` is unset the service is absent from
//! application state and callers log a warning instead of sending.

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),
}

#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    public_url: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig, public_url: &str) -> Result<Self, SmtpError> {
        let credentials =
            Credentials::new(config.username.clone(), config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            public_url: public_url.to_string(),
        })
    }

    pub async fn send_verification(&self, to: &str, token: &str) -> Result<(), EmailError> {
        let body = format!(
            "Welcome to Arcana.\n\n\
             Confirm your email address by posting this token to {}/api/auth/verify:\n\n\
             {token}\n\n\
             If you did not create an account, ignore this message.\n",
            self.public_url
        );
        self.send(to, "Confirm your Arcana account", body).await
    }

    pub async fn send_password_reset(&self, to: &str, token: &str) -> Result<(), EmailError> {
        let body = format!(
            "A password reset was requested for your Arcana account.\n\n\
             Use this token within one hour at {}/api/auth/reset/confirm:\n\n\
             {token}\n\n\
             If you did not request a reset, ignore this message.\n",
            self.public_url
        );
        self.send(to, "Reset your Arcana password", body).await
    }

    pub async fn send_order_confirmation(
        &self,
        to: &str,
        invoice_number: &str,
        total_cents: i64,
    ) -> Result<(), EmailError> {
        let body = format!(
            "Thank you for your order.\n\n\
             Invoice: {invoice_number}\n\
             Total: ${}.{:02}\n\n\
             We will email you again once your order ships.\n",
            total_cents / 100,
            total_cents % 100
        );
        self.send(to, &format!("Order confirmed ({invoice_number})"), body)
            .await
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(self.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.mailer.send(message).await?;
        Ok(())
    }
}
