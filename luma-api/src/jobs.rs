use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use luma_order::models::normalize_email;
use luma_store::{JobKind, NotificationJob};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/jobs/email/order-created", post(enqueue_order_created))
        .route("/api/jobs/email/receipt", post(enqueue_receipt))
        .route("/api/jobs/next", get(next_job))
        .route("/api/jobs/requeue", post(requeue_job))
        .route("/api/jobs/{id}/ack", post(ack_job))
}

#[derive(Debug, Deserialize)]
pub struct OrderCreatedJobRequest {
    pub to_email: String,
    pub order_id: i64,
    pub service_type: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptJobRequest {
    pub to_email: String,
    pub order_id: i64,
    pub amount_cents: i64,
    pub transaction_id: String,
    #[serde(default)]
    pub service_type: String,
}

fn require_email(raw: &str) -> Result<String, AppError> {
    let email = normalize_email(raw);
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::ValidationError(
            "A valid recipient email is required".to_string(),
        ));
    }
    Ok(email)
}

async fn enqueue_order_created(
    State(state): State<AppState>,
    Json(req): Json<OrderCreatedJobRequest>,
) -> Result<impl IntoResponse, AppError> {
    let to_email = require_email(&req.to_email)?;
    let job = NotificationJob {
        job_id: Uuid::new_v4(),
        kind: JobKind::OrderCreated,
        to_email,
        order_id: req.order_id,
        service_type: req.service_type,
        scheduled_at: req.scheduled_at,
        address: req.address,
        amount_cents: None,
        transaction_id: None,
        created_at: Utc::now(),
    };
    let id = state.queue.enqueue(job).await;
    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": id }))))
}

async fn enqueue_receipt(
    State(state): State<AppState>,
    Json(req): Json<ReceiptJobRequest>,
) -> Result<impl IntoResponse, AppError> {
    let to_email = require_email(&req.to_email)?;
    if req.amount_cents <= 0 {
        return Err(AppError::ValidationError(
            "Receipt amount must be positive".to_string(),
        ));
    }
    let job = NotificationJob {
        job_id: Uuid::new_v4(),
        kind: JobKind::Receipt,
        to_email,
        order_id: req.order_id,
        service_type: req.service_type,
        scheduled_at: Utc::now(),
        address: String::new(),
        amount_cents: Some(req.amount_cents),
        transaction_id: Some(req.transaction_id),
        created_at: Utc::now(),
    };
    let id = state.queue.enqueue(job).await;
    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": id }))))
}

/// 200 with the job, or 204 when the queue is empty.
async fn next_job(State(state): State<AppState>) -> impl IntoResponse {
    match state.queue.next().await {
        Some(job) => (StatusCode::OK, Json(job)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn requeue_job(
    State(state): State<AppState>,
    Json(job): Json<NotificationJob>,
) -> StatusCode {
    state.queue.requeue(job).await;
    StatusCode::ACCEPTED
}

async fn ack_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.queue.ack(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFoundError(format!("Unknown job: {id}")))
    }
}
