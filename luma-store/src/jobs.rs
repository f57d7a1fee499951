use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use luma_core::BoxError;
use luma_order::models::Order;
use luma_order::repository::NotificationSink;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    #[serde(rename = "order-created")]
    OrderCreated,
    #[serde(rename = "receipt")]
    Receipt,
}

/// One queued email. Requeue puts the record back unmutated, so a job's
/// payload is stable across any number of delivery failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub to_email: String,
    pub order_id: i64,
    pub service_type: String,
    pub scheduled_at: DateTime<Utc>,
    pub address: String,
    pub amount_cents: Option<i64>,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationJob {
    pub fn order_created(order: &Order) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            kind: JobKind::OrderCreated,
            to_email: order.user_email.clone(),
            order_id: order.id,
            service_type: order.service_type.clone(),
            scheduled_at: order.scheduled_at,
            address: order.address_display(),
            amount_cents: None,
            transaction_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn receipt(order: &Order, amount_cents: i64, transaction_id: &str) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            kind: JobKind::Receipt,
            to_email: order.user_email.clone(),
            order_id: order.id,
            service_type: order.service_type.clone(),
            scheduled_at: order.scheduled_at,
            address: order.address_display(),
            amount_cents: Some(amount_cents),
            transaction_id: Some(transaction_id.to_string()),
            created_at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<NotificationJob>,
    in_flight: HashMap<Uuid, NotificationJob>,
}

/// FIFO notification queue. A popped job sits in flight until it is acked
/// or requeued; depth counts both so backlog stays observable while a
/// worker holds a job.
#[derive(Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, job: NotificationJob) -> Uuid {
        let id = job.job_id;
        let mut state = self.state.lock().await;
        state.ready.push_back(job);
        tracing::debug!(job_id = %id, depth = state.ready.len(), "notification job enqueued");
        id
    }

    pub async fn next(&self) -> Option<NotificationJob> {
        let mut state = self.state.lock().await;
        let job = state.ready.pop_front()?;
        state.in_flight.insert(job.job_id, job.clone());
        Some(job)
    }

    /// Appends the job back to the tail, byte for byte as handed out.
    pub async fn requeue(&self, job: NotificationJob) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&job.job_id);
        state.ready.push_back(job);
    }

    pub async fn ack(&self, job_id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&job_id).is_some()
    }

    pub async fn depth(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.in_flight.len()
    }
}

#[async_trait]
impl NotificationSink for JobQueue {
    async fn receipt(
        &self,
        order: &Order,
        amount_cents: i64,
        transaction_id: &str,
    ) -> Result<(), BoxError> {
        self.enqueue(NotificationJob::receipt(order, amount_cents, transaction_id))
            .await;
        Ok(())
    }
}
