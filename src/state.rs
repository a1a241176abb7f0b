use std::sync::Arc;

use crate::{
    config::AppConfig, db::DbPool, email::EmailService, payments::StripeClient, store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    /// Absent when no SMTP relay is configured; callers warn and continue.
    pub mailer: Option<EmailService>,
    /// Absent when no Stripe key is configured; payment falls back to manual
    /// confirmation.
    pub payments: Option<StripeClient>,
    pub store: Arc<Store>,
}

impl AppState {
    pub fn build(config: AppConfig, pool: DbPool) -> anyhow::Result<Self> {
        let mailer = match &config.smtp {
            Some(smtp) => Some(EmailService::new(smtp, &config.public_url)?),
            None => None,
        };
        let payments = config
            .stripe_secret_key
            .as_deref()
            .map(StripeClient::new);
        let store = Arc::new(Store::from_config(&config.store_provider, pool.clone())?);

        Ok(Self {
            pool,
            config: Arc::new(config),
            mailer,
            payments,
            store,
        })
    }
}
