//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_engine::billing::FailedPaymentHandler;
use courier_engine::receipts::ReceiptDispatcher;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub receipts: Arc<ReceiptDispatcher>,
    pub billing: Arc<FailedPaymentHandler>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        receipts: Arc<ReceiptDispatcher>,
        billing: Arc<FailedPaymentHandler>,
    ) -> Self {
        Self {
            pool,
            config,
            receipts,
            billing,
        }
    }
}
