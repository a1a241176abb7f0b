use std::{env, path::PathBuf};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Base URL used when building links in emails and upload URLs.
    pub public_url: String,
    /// Backend for the dynamic-collection store, e.g. "postgres".
    pub store_provider: String,
    pub upload_dir: PathBuf,
    pub cookie_secure: bool,
    /// SMTP relay; transactional email is skipped when unset.
    pub smtp: Option<SmtpConfig>,
    /// Stripe secret key; payment falls back to manual confirmation when unset.
    pub stripe_secret_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://{host}:{port}"));
        let store_provider =
            env::var("STORE_PROVIDER").unwrap_or_else(|_| "postgres".to_string());
        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));
        let cookie_secure = public_url.starts_with("https://");

        let smtp = match env::var("SMTP_HOST") {
            Ok(smtp_host) => {
                let smtp_port = env::var("SMTP_PORT")
                    .ok()
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or(587);
                Some(SmtpConfig {
                    host: smtp_host,
                    port: smtp_port,
                    username: env::var("SMTP_USERNAME").unwrap_or_default(),
                    password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                    from_address: env::var("SMTP_FROM")
                        .unwrap_or_else(|_| "noreply@localhost".to_string()),
                })
            }
            Err(_) => None,
        };

        let stripe_secret_key = env::var("STRIPE_SECRET_KEY").ok();

        Ok(Self {
            database_url,
            host,
            port,
            public_url,
            store_provider,
            upload_dir,
            cookie_secure,
            smtp,
            stripe_secret_key,
        })
    }
}
