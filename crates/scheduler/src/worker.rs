//! Digest queue worker.
//!
//! Pops jobs off the Redis queue and runs them through the builder. Failures
//! are isolated per job: a job whose handling fails goes to the dead-letter
//! list with the error attached, and the worker moves on. A Redis error on
//! pop or dead-letter is logged and retried after a backoff; it never kills
//! the worker.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use courier_engine::digest::DigestBuilder;

use crate::queue;

/// Blocking-pop timeout; keeps the loop responsive to shutdown.
const POP_TIMEOUT_SECS: f64 = 5.0;

/// Pause after a Redis error before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct DigestWorker {
    id: usize,
    pool: PgPool,
    redis: ConnectionManager,
    builder: Arc<DigestBuilder>,
}

impl DigestWorker {
    pub fn new(
        id: usize,
        pool: PgPool,
        redis: ConnectionManager,
        builder: Arc<DigestBuilder>,
    ) -> Self {
        Self {
            id,
            pool,
            redis,
            builder,
        }
    }

    /// Consume jobs until the task is cancelled.
    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!(worker = self.id, "Digest worker started");

        loop {
            let popped = match queue::pop(&mut self.redis, POP_TIMEOUT_SECS).await {
                Ok(popped) => popped,
                Err(e) => {
                    tracing::warn!(
                        worker = self.id,
                        error = %e,
                        "Queue pop failed, backing off"
                    );
                    tokio::time::sleep(ERROR_BACKOFF).await;
                    continue;
                }
            };

            let Some((job, payload)) = popped else {
                continue;
            };

            match self.builder.run(&self.pool, &job).await {
                Ok(sent) => {
                    tracing::debug!(
                        worker = self.id,
                        user_id = %job.user_id,
                        sent,
                        "Digest job finished"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        worker = self.id,
                        user_id = %job.user_id,
                        error = %e,
                        "Digest job failed"
                    );
                    if let Err(dead_err) =
                        queue::dead_letter(&mut self.redis, &payload, &e.to_string()).await
                    {
                        tracing::error!(
                            worker = self.id,
                            error = %dead_err,
                            "Dead-lettering failed, job dropped"
                        );
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }
}
