//! Payment gateway webhook endpoint.
//!
//! The gateway posts an event envelope carrying the object that changed.
//! Handling happens on a spawned task so the gateway gets its 200 back
//! immediately; the gateway retries delivery on non-2xx, so only auth and
//! malformed-body failures are surfaced as errors.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use courier_common::error::AppError;

use crate::state::AppState;

/// Shared-secret header the gateway is configured to send.
pub const WEBHOOK_SECRET_HEADER: &str = "x-courier-webhook-secret";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/payment", post(payment_webhook))
}

/// Event envelope posted by the payment gateway.
#[derive(Debug, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: GatewayEventData,
}

#[derive(Debug, Deserialize)]
pub struct GatewayEventData {
    pub object: serde_json::Value,
}

/// POST /webhooks/payment — dispatch a gateway event to its handler.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<GatewayEvent>,
) -> Result<Json<serde_json::Value>, AppError> {
    verify_secret(&headers, &state.config.webhook_secret)?;

    let object_id = event
        .data
        .object
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Gateway webhook received"
    );

    match event.event_type.as_str() {
        "charge.succeeded" => {
            let id = require_object_id(object_id, &event.event_type)?;
            let receipts = state.receipts.clone();
            tokio::spawn(async move {
                if let Err(e) = receipts.send_charge_receipt(&id).await {
                    tracing::error!(charge_id = %id, error = %e, "Charge receipt failed");
                }
            });
        }
        "invoice.payment_succeeded" => {
            let id = require_object_id(object_id, &event.event_type)?;
            let receipts = state.receipts.clone();
            let pool = state.pool.clone();
            tokio::spawn(async move {
                if let Err(e) = receipts.send_invoice_receipt(&pool, &id).await {
                    tracing::error!(invoice_id = %id, error = %e, "Invoice receipt failed");
                }
            });
        }
        "invoice.payment_failed" => {
            let id = require_object_id(object_id, &event.event_type)?;
            let billing = state.billing.clone();
            let pool = state.pool.clone();
            tokio::spawn(async move {
                if let Err(e) = billing.handle_failed_invoice(&pool, &id).await {
                    tracing::error!(invoice_id = %id, error = %e, "Failed payment handling failed");
                }
            });
        }
        other => {
            tracing::debug!(event_type = %other, "Ignoring unhandled gateway event");
        }
    }

    Ok(Json(json!({ "received": true })))
}

fn verify_secret(headers: &HeaderMap, expected: &str) -> Result<(), AppError> {
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Auth("Missing webhook secret header".to_string()))?;

    if provided != expected {
        return Err(AppError::Auth("Invalid webhook secret".to_string()));
    }
    Ok(())
}

fn require_object_id(id: Option<String>, event_type: &str) -> Result<String, AppError> {
    id.ok_or_else(|| {
        AppError::Validation(format!("Event {} is missing data.object.id", event_type))
    })
}
