//! Minute ticker that fires digest triggers.
//!
//! Once per wall-clock minute, every trigger whose schedule matches that
//! minute fires: its audience is selected and one independent digest job is
//! enqueued per user. A trigger failure is logged and does not block the
//! other triggers or the next tick.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Timelike, Utc};
use redis::aio::ConnectionManager;
use sqlx::PgPool;

use courier_common::types::DigestJob;
use courier_engine::digest::{staff_users, users_due_for_digest};
use courier_engine::schedule::{Audience, TriggerSpec};

use crate::queue;

/// How often the ticker checks whether a new minute started.
const TICK_INTERVAL: StdDuration = StdDuration::from_secs(5);

pub struct DigestScheduler {
    pool: PgPool,
    redis: ConnectionManager,
    triggers: Vec<TriggerSpec>,
}

impl DigestScheduler {
    /// The trigger table is passed in, not read from a global.
    pub fn new(pool: PgPool, redis: ConnectionManager, triggers: Vec<TriggerSpec>) -> Self {
        Self {
            pool,
            redis,
            triggers,
        }
    }

    /// Run the ticking loop. Runs indefinitely until the task is cancelled.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        tracing::info!(triggers = self.triggers.len(), "Digest scheduler started");

        let mut last_minute: Option<DateTime<Utc>> = None;
        let triggers = self.triggers.clone();

        loop {
            let minute = truncate_to_minute(Utc::now());

            if last_minute != Some(minute) {
                last_minute = Some(minute);

                for spec in &triggers {
                    if !spec.trigger.matches_minute(minute) {
                        continue;
                    }
                    if let Err(e) = self.fire(spec).await {
                        tracing::error!(
                            trigger = %spec.trigger,
                            error = %e,
                            "Digest trigger failed"
                        );
                    }
                }
            }

            tokio::time::sleep(TICK_INTERVAL).await;
        }
    }

    /// Select the trigger's audience and enqueue one job per user.
    pub async fn fire(&mut self, spec: &TriggerSpec) -> anyhow::Result<()> {
        let users = match spec.audience {
            Audience::Preference(interval) => {
                users_due_for_digest(&self.pool, interval).await?
            }
            Audience::Staff => staff_users(&self.pool).await?,
        };

        if users.is_empty() {
            tracing::debug!(trigger = %spec.trigger, "No users due, nothing enqueued");
            return Ok(());
        }

        // Each user is an independent unit of work: an enqueue failure is
        // logged and the remaining users still get their jobs.
        let mut enqueued = 0usize;
        for user in &users {
            let job = DigestJob {
                user_id: user.id,
                subject: spec.subject.clone(),
                window_secs: spec.window.num_seconds(),
                kind: spec.kind,
            };
            match queue::enqueue(&mut self.redis, &job).await {
                Ok(()) => enqueued += 1,
                Err(e) => {
                    tracing::error!(
                        trigger = %spec.trigger,
                        user_id = %user.id,
                        error = %e,
                        "Failed to enqueue digest job"
                    );
                }
            }
        }

        tracing::info!(
            trigger = %spec.trigger,
            jobs = enqueued,
            users = users.len(),
            "Digest jobs enqueued"
        );
        Ok(())
    }
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_to_minute() {
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 10, 17, 42).unwrap();
        let truncated = truncate_to_minute(t);
        assert_eq!(truncated.second(), 0);
        assert_eq!(truncated.minute(), 17);
        assert_eq!(truncated.hour(), 10);
    }
}
