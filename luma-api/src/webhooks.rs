use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use hmac::{Hmac, Mac};
use luma_core::payment::WebhookEventKind;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/webhooks/card", post(handle_card_webhook))
}

#[derive(Debug, Deserialize)]
struct CardWebhook {
    #[serde(rename = "type")]
    type_: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: IntentObject,
}

#[derive(Debug, Deserialize)]
struct IntentObject {
    id: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// Verifies a `t=<unix>,v1=<hex>` signature over `"{t}.{body}"` with
/// HMAC-SHA256 and rejects stale timestamps.
pub fn verify_signature(payload: &str, sig_header: &str, secret: &str) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signature = "";
    for part in sig_header.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = v;
        }
    }
    if timestamp.is_empty() || signature.is_empty() {
        return Err("Invalid signature header");
    }

    let signed_payload = format!("{timestamp}.{payload}");
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(signed_payload.as_bytes());

    let sig_bytes = hex::decode(signature).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Signature mismatch")?;

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if (chrono::Utc::now().timestamp() - ts).abs() > 300 {
        return Err("Timestamp outside tolerance");
    }
    Ok(())
}

/// POST /api/webhooks/card
///
/// The signature is checked against the raw body before anything in the
/// payload is trusted; a bad signature performs no side effects.
async fn handle_card_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if let Some(secret) = state.webhook_secret.as_deref() {
        let sig = headers
            .get("card-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::ValidationError("Missing signature header".to_string()))?;
        verify_signature(&body, sig, secret)
            .map_err(|e| AppError::ValidationError(e.to_string()))?;
    } else {
        tracing::warn!("webhook secret unset; accepting unsigned webhook");
    }

    let payload: CardWebhook = serde_json::from_str(&body)
        .map_err(|e| AppError::ValidationError(format!("Malformed webhook payload: {e}")))?;

    let Some(kind) = WebhookEventKind::parse(&payload.type_) else {
        // Unknown event types are acknowledged and ignored.
        tracing::info!(event_type = %payload.type_, "ignoring unhandled webhook event");
        return Ok((StatusCode::OK, Json(json!({ "handled": false }))));
    };

    let metadata_order_id = payload.data.object.metadata["order_id"]
        .as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .or_else(|| payload.data.object.metadata["order_id"].as_i64());

    let order = state
        .gateway
        .orchestrator()
        .handle_webhook(kind, &payload.data.object.id, metadata_order_id)
        .await
        .map_err(luma_store::GatewayError::Payment)?;

    match order {
        Some(order) => {
            tracing::info!(order_id = order.id, event_type = %payload.type_, "webhook applied");
            Ok((StatusCode::OK, Json(json!({ "handled": true, "order_id": order.id }))))
        }
        None => {
            tracing::warn!(intent_id = %payload.data.object.id, "webhook did not match any order");
            Ok((StatusCode::OK, Json(json!({ "handled": false }))))
        }
    }
}
