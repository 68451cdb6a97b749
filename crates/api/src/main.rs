//! Courier API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::db::create_pool;
use courier_engine::billing::FailedPaymentHandler;
use courier_engine::gateway::HttpGateway;
use courier_engine::receipts::ReceiptDispatcher;
use courier_mailer::ResendMailer;

use courier_api::routes::create_router;
use courier_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("courier_api=debug,courier_engine=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Courier API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Payment gateway client
    let gateway = Arc::new(HttpGateway::new(
        config.gateway_api_url.clone(),
        config.gateway_api_key.clone(),
    ));

    // Outbound mailer
    let api_key = config.resend_api_key.clone().unwrap_or_else(|| {
        tracing::warn!("RESEND_API_KEY not set, email delivery will fail");
        String::new()
    });
    let mailer = Arc::new(ResendMailer::new(api_key, config.email_from.clone()));

    let receipts = Arc::new(ReceiptDispatcher::new(gateway.clone(), mailer.clone()));
    let billing = Arc::new(FailedPaymentHandler::new(gateway, mailer));

    // Build application state
    let state = AppState::new(pool, config, receipts, billing);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
