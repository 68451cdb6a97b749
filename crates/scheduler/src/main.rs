//! Courier scheduler binary: digest trigger ticker plus queue workers.

use std::sync::Arc;

use courier_common::config::AppConfig;
use courier_common::db;
use courier_common::redis_pool::create_redis_pool;
use courier_engine::digest::DigestBuilder;
use courier_engine::schedule::default_triggers;
use courier_mailer::ResendMailer;

use courier_scheduler::ticker::DigestScheduler;
use courier_scheduler::worker::DigestWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_scheduler=info,courier_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("Courier scheduler starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Connect to Redis
    let redis = create_redis_pool(&config.redis_url).await?;

    // Build the mailer
    let api_key = config.resend_api_key.clone().unwrap_or_else(|| {
        tracing::warn!("RESEND_API_KEY not set, email delivery will fail");
        String::new()
    });
    let mailer = Arc::new(ResendMailer::new(api_key, config.email_from.clone()));
    let builder = Arc::new(DigestBuilder::new(mailer));

    // One ticker plus a pool of queue workers
    let mut tasks = tokio::task::JoinSet::new();

    let mut scheduler = DigestScheduler::new(pool.clone(), redis.clone(), default_triggers());
    tasks.spawn(async move { scheduler.run().await });

    for id in 0..config.digest_workers {
        let digest_worker = DigestWorker::new(id, pool.clone(), redis.clone(), builder.clone());
        tasks.spawn(async move { digest_worker.run().await });
    }

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        Some(result) = tasks.join_next() => {
            match result {
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Scheduler task exited with error");
                    return Err(e);
                }
                Ok(Ok(())) => tracing::warn!("Scheduler task exited unexpectedly"),
                Err(e) => tracing::error!(error = %e, "Scheduler task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Courier scheduler stopped.");
    Ok(())
}
