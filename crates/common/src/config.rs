use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Payment gateway API base URL
    pub gateway_api_url: String,

    /// Payment gateway API key (bearer auth)
    pub gateway_api_key: String,

    /// Shared secret expected in the webhook endpoint header
    pub webhook_secret: String,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: String,

    /// Base URL of the public site, used in notice links
    pub site_url: String,

    /// Number of concurrent digest queue workers (default: 4)
    pub digest_workers: usize,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            gateway_api_url: std::env::var("GATEWAY_API_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            gateway_api_key: std::env::var("GATEWAY_API_KEY")
                .map_err(|_| anyhow::anyhow!("GATEWAY_API_KEY environment variable is required"))?,
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .map_err(|_| anyhow::anyhow!("WEBHOOK_SECRET environment variable is required"))?,
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "info@courier.example.com".to_string()),
            site_url: std::env::var("SITE_URL")
                .unwrap_or_else(|_| "https://courier.example.com".to_string()),
            digest_workers: std::env::var("DIGEST_WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DIGEST_WORKERS must be a valid usize"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }
}
