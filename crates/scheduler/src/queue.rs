//! Redis-backed digest job queue.
//!
//! Jobs are JSON on a list: LPUSH to enqueue, BRPOP to consume. Jobs whose
//! handling fails are moved to a dead-letter list with the error attached.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde_json::json;

use courier_common::types::DigestJob;

pub const DIGEST_QUEUE: &str = "courier:digest:jobs";
pub const DEAD_LETTER_QUEUE: &str = "courier:digest:dead";

/// Push one digest job onto the queue.
pub async fn enqueue(redis: &mut ConnectionManager, job: &DigestJob) -> anyhow::Result<()> {
    let payload = serde_json::to_string(job)?;
    redis.lpush::<_, _, ()>(DIGEST_QUEUE, payload).await?;
    Ok(())
}

/// Block up to `timeout_secs` for the next job. Returns the parsed job and
/// its raw payload (kept for dead-lettering). A payload that fails to parse
/// is dead-lettered immediately rather than crashing the worker.
pub async fn pop(
    redis: &mut ConnectionManager,
    timeout_secs: f64,
) -> anyhow::Result<Option<(DigestJob, String)>> {
    let result: Option<(String, String)> = redis.brpop(DIGEST_QUEUE, timeout_secs).await?;

    let Some((_, payload)) = result else {
        return Ok(None);
    };

    match serde_json::from_str::<DigestJob>(&payload) {
        Ok(job) => Ok(Some((job, payload))),
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable digest job, dead-lettering");
            dead_letter(redis, &payload, &e.to_string()).await?;
            Ok(None)
        }
    }
}

/// Record a failed job with the error that killed it.
pub async fn dead_letter(
    redis: &mut ConnectionManager,
    payload: &str,
    error: &str,
) -> anyhow::Result<()> {
    let entry = json!({ "job": payload, "error": error }).to_string();
    redis.lpush::<_, _, ()>(DEAD_LETTER_QUEUE, entry).await?;
    Ok(())
}
