//! Digest scheduling: a minute ticker that fires digest triggers, a Redis
//! job queue, and workers that consume digest jobs.

pub mod queue;
pub mod ticker;
pub mod worker;
