//! Business logic for digest scheduling, receipt dispatch, and billing
//! failure handling. Everything here is driven either by the scheduler
//! binary (digest jobs) or by the webhook API (gateway events).

pub mod billing;
pub mod digest;
pub mod gateway;
pub mod notices;
pub mod receipts;
pub mod schedule;
