use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use luma_order::models::{Order, OrderStatus, PaymentStatus};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/orders", get(list_orders))
        .route("/api/admin/orders/{id}", delete(delete_order))
        .route("/api/admin/orders/{id}/status", post(update_status))
        .route("/api/admin/orders/{id}/admin-notes", post(update_admin_notes))
        .route(
            "/api/admin/orders/{id}/payment-status",
            post(update_payment_status),
        )
}

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
    #[serde(default = "default_actor")]
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub payment_status: PaymentStatus,
    #[serde(default = "default_actor")]
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub notes: String,
    #[serde(default = "default_actor")]
    pub actor: String,
}

fn default_actor() -> String {
    "admin".to_string()
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let status = match query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        None => None,
        Some(raw) => Some(
            serde_json::from_value::<OrderStatus>(serde_json::Value::String(raw.to_string()))
                .map_err(|_| AppError::ValidationError(format!("Unknown status: {raw}")))?,
        ),
    };
    let listed = state
        .gateway
        .list_admin(status, query.search.as_deref())
        .await?;
    Ok(Json(listed.value))
}

/// Staff-driven status change. Entering Ready with a chargeable payment
/// status also generates the invoice and runs the charge; those side
/// effects are non-blocking and show up in the returned order.
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Order>, AppError> {
    let updated = state
        .gateway
        .update_status(id, req.status, &req.actor)
        .await?;
    Ok(Json(updated.value))
}

async fn update_admin_notes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<NotesRequest>,
) -> Result<Json<Order>, AppError> {
    let updated = state
        .gateway
        .update_admin_notes(id, &req.notes, &req.actor)
        .await?;
    Ok(Json(updated.value))
}

async fn update_payment_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<PaymentStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let updated = state
        .gateway
        .update_payment_status(id, req.payment_status, &req.actor)
        .await?;
    Ok(Json(updated.value))
}

async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let deleted = state.gateway.delete(id).await?;
    if deleted.value {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFoundError(format!("Order not found: {id}")))
    }
}
