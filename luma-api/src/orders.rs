use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use luma_order::models::{normalize_email, Address, NewOrder, Order};
use luma_order::repository::NewPaymentMethod;
use luma_pricing::{calculate, PricingType, Quote, QuoteInput, QuoteItemInput};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;
use luma_store::NotificationJob;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/orders", post(create_order).get(list_orders))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/cancel", post(cancel_order))
        .route("/api/orders/{id}/approve", post(approve_quote))
        .route("/api/orders/{id}/payment-method", post(save_payment_method))
        .route(
            "/api/orders/{id}/payment-method/update",
            post(save_payment_method),
        )
        .route("/api/orders/{id}/quote", post(quote_order))
        .route("/api/orders/{id}/invoice", get(get_invoice))
        .route("/api/orders/{id}/invoice/generate", post(generate_invoice))
        .route("/api/orders/{id}/payment/attempt", post(attempt_payment))
        .route("/api/orders/{id}/payment/retry", post(retry_payment))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_email: String,
    pub service_type: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "userEmail")]
    pub user_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentMethodRequest {
    pub card_token: String,
    pub card_last4: String,
    #[serde(default)]
    pub card_brand: String,
    #[serde(default)]
    pub expiry_month: String,
    #[serde(default)]
    pub expiry_year: String,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub pricing_type: Option<String>,
    pub wash_fold_weight_lbs: Option<f64>,
    pub weighted_blanket_weight_lbs: Option<f64>,
    #[serde(default)]
    pub items: Vec<QuoteItemInput>,
    pub estimated_total_dollars: Option<f64>,
    pub estimated_amount_cents: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub order: Order,
    pub quote: Quote,
}

// ============================================================================
// Handlers
// ============================================================================

const SERVICE_TYPES: &[&str] = &["Pickup", "Delivery", "Both"];

async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&req.user_email);
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::ValidationError(
            "A valid email address is required".to_string(),
        ));
    }
    if !SERVICE_TYPES.contains(&req.service_type.as_str()) {
        return Err(AppError::ValidationError(format!(
            "Unknown service type: {}",
            req.service_type
        )));
    }
    if req.scheduled_at <= Utc::now() {
        return Err(AppError::ValidationError(
            "Pickup must be scheduled in the future".to_string(),
        ));
    }
    if req.address.is_blank() {
        return Err(AppError::ValidationError(
            "A pickup address is required".to_string(),
        ));
    }

    let created = state
        .gateway
        .create(NewOrder {
            user_email: email,
            service_type: req.service_type,
            scheduled_at: req.scheduled_at,
            address: req.address,
            notes: req.notes,
        })
        .await?;

    state
        .queue
        .enqueue(NotificationJob::order_created(&created.value))
        .await;

    tracing::info!(order_id = created.value.id, degraded = created.degraded, "order created");
    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            order: created.value,
            degraded: created.degraded,
        }),
    ))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    let found = state.gateway.get(id).await?;
    found
        .value
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("Order not found: {id}")))
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let email = query
        .user_email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AppError::ValidationError("userEmail query parameter is required".to_string()))?;
    let listed = state.gateway.list_by_user(&email).await?;
    Ok(Json(listed.value))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    let updated = state
        .gateway
        .update_status(id, luma_order::models::OrderStatus::Cancelled, "customer")
        .await?;
    Ok(Json(updated.value))
}

/// Customer sign-off on a pending quote. Runs through the same transition
/// rules as the admin status endpoint.
async fn approve_quote(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    let updated = state
        .gateway
        .update_status(id, luma_order::models::OrderStatus::Approved, "customer")
        .await?;
    Ok(Json(updated.value))
}

async fn save_payment_method(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<PaymentMethodRequest>,
) -> Result<Json<Order>, AppError> {
    if req.card_token.trim().is_empty() {
        return Err(AppError::ValidationError(
            "A card token is required".to_string(),
        ));
    }
    let order = state
        .gateway
        .get(id)
        .await?
        .value
        .ok_or_else(|| AppError::NotFoundError(format!("Order not found: {id}")))?;

    let updated = state
        .gateway
        .save_payment_method(
            id,
            NewPaymentMethod {
                user_email: order.user_email,
                card_token: req.card_token,
                card_last4: req.card_last4,
                card_brand: req.card_brand,
                expiry_month: req.expiry_month,
                expiry_year: req.expiry_year,
            },
        )
        .await?;
    Ok(Json(updated.value))
}

async fn quote_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let pricing_type = req.pricing_type.as_deref().map(PricingType::parse);

    if req.wash_fold_weight_lbs.map(|w| w < 0.0).unwrap_or(false)
        || req
            .weighted_blanket_weight_lbs
            .map(|w| w < 0.0)
            .unwrap_or(false)
    {
        return Err(AppError::ValidationError(
            "Weights cannot be negative".to_string(),
        ));
    }
    for item in &req.items {
        let code = item.item_code.trim();
        if code.eq_ignore_ascii_case(luma_pricing::WEIGHTED_BLANKET_CODE) {
            continue;
        }
        if luma_pricing::lookup_item(code).is_none() {
            return Err(AppError::ValidationError(format!(
                "Unknown item code: {}",
                item.item_code
            )));
        }
    }

    let input = QuoteInput {
        pricing_type: pricing_type.unwrap_or_default(),
        wash_fold_weight_lbs: req.wash_fold_weight_lbs,
        weighted_blanket_weight_lbs: req.weighted_blanket_weight_lbs,
        items: req.items,
        estimated_total_dollars: req.estimated_total_dollars,
        estimated_amount_cents: req.estimated_amount_cents,
    };
    let quote = calculate(&input);

    let updated = state
        .gateway
        .quote_order(id, &quote, req.wash_fold_weight_lbs, pricing_type, "staff")
        .await?;

    Ok(Json(QuoteResponse {
        order: updated.value,
        quote,
    }))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<luma_order::models::Invoice>, AppError> {
    let found = state.gateway.get_invoice(id).await?;
    found
        .value
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("No invoice for order {id}")))
}

async fn generate_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<luma_order::models::Invoice>, AppError> {
    let invoice = state.gateway.generate_invoice(id).await?;
    Ok(Json(invoice.value))
}

async fn attempt_payment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.gateway.attempt_payment(id, "staff").await?;
    Ok(charge_response(result.value))
}

async fn retry_payment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.gateway.retry_payment(id, "customer").await?;
    Ok(charge_response(result.value))
}

/// Declines are an expected outcome, not a handler error: 402 with the
/// failure detail in the body.
fn charge_response(summary: luma_store::ChargeSummary) -> impl IntoResponse {
    let status = if summary.succeeded {
        StatusCode::OK
    } else {
        StatusCode::PAYMENT_REQUIRED
    };
    (
        status,
        Json(json!({
            "succeeded": summary.succeeded,
            "amount_cents": summary.amount_cents,
            "transaction_id": summary.transaction_id,
            "failure_reason": summary.failure_reason,
            "next_retry_at": summary.next_retry_at,
            "order": summary.order,
        })),
    )
}
