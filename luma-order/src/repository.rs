use async_trait::async_trait;
use chrono::{DateTime, Utc};
use luma_core::BoxError;

use crate::models::{
    AttemptStatus, Invoice, NewOrder, Order, PaymentAttempt, PaymentMethod,
};

/// Attempt record as built by the orchestrator. The store allocates the
/// strictly-increasing attempt number at insertion time so two racing
/// retries cannot collide on it.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub order_id: i64,
    pub invoice_id: Option<i64>,
    pub status: AttemptStatus,
    pub amount_cents: i64,
    pub failure_reason: String,
    pub transaction_id: String,
    pub next_retry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentMethod {
    pub user_email: String,
    pub card_token: String,
    pub card_last4: String,
    pub card_brand: String,
    pub expiry_month: String,
    pub expiry_year: String,
}

/// Repository seam over durable order data. Implemented by the in-process
/// store and mirrored by the remote order service.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, draft: NewOrder) -> Result<Order, BoxError>;
    async fn get_order(&self, id: i64) -> Result<Option<Order>, BoxError>;
    async fn save_order(&self, order: &Order) -> Result<(), BoxError>;
    async fn delete_order(&self, id: i64) -> Result<bool, BoxError>;
    async fn list_by_user(&self, user_email: &str) -> Result<Vec<Order>, BoxError>;
    async fn list_all(&self) -> Result<Vec<Order>, BoxError>;
    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Order>, BoxError>;

    /// Idempotent per order: an existing invoice is returned untouched.
    async fn create_invoice(
        &self,
        order_id: i64,
        subtotal_cents: i64,
        tax_cents: i64,
        delivery_fee_cents: i64,
        line_items: String,
    ) -> Result<Invoice, BoxError>;
    async fn get_invoice(&self, order_id: i64) -> Result<Option<Invoice>, BoxError>;
    async fn save_invoice(&self, invoice: &Invoice) -> Result<(), BoxError>;

    async fn append_attempt(&self, attempt: NewAttempt) -> Result<PaymentAttempt, BoxError>;
    async fn last_attempt(&self, order_id: i64) -> Result<Option<PaymentAttempt>, BoxError>;
    async fn list_attempts(&self, order_id: i64) -> Result<Vec<PaymentAttempt>, BoxError>;

    async fn save_payment_method(
        &self,
        method: NewPaymentMethod,
    ) -> Result<PaymentMethod, BoxError>;
    async fn get_payment_method(&self, id: i64) -> Result<Option<PaymentMethod>, BoxError>;
}

/// Outbound notification seam for events raised inside the payment
/// workflow. Backed by the notification job queue; delivery happens in the
/// worker, never inline. Order-creation emails are enqueued at the HTTP
/// layer, which owns the queue directly.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn receipt(
        &self,
        order: &Order,
        amount_cents: i64,
        transaction_id: &str,
    ) -> Result<(), BoxError>;
}
