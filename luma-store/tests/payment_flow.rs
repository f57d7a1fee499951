use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use luma_order::models::{
    Address, AttemptStatus, InvoiceStatus, NewOrder, Order, OrderStatus, PaymentStatus,
};
use luma_order::orchestrator::{MockCardGateway, MockMode, PaymentError};
use luma_order::repository::{NewPaymentMethod, OrderRepository};
use luma_pricing::{calculate, QuoteInput};
use luma_store::remote::{ChargeSummary, RemoteError, RemoteOrders};
use luma_store::{JobKind, JobQueue, MemoryOrderStore, ResilientOrderGateway};

fn draft() -> NewOrder {
    NewOrder {
        user_email: "jane@example.com".to_string(),
        service_type: "Pickup".to_string(),
        scheduled_at: Utc::now() + Duration::days(1),
        address: Address {
            line1: "12 Main St".to_string(),
            line2: String::new(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip_code: "62704".to_string(),
        },
        notes: String::new(),
    }
}

fn local_gateway(mode: MockMode) -> (ResilientOrderGateway, Arc<JobQueue>, Arc<MemoryOrderStore>) {
    let store = Arc::new(MemoryOrderStore::new());
    let queue = Arc::new(JobQueue::new());
    let gateway = ResilientOrderGateway::new(
        None,
        store.clone(),
        Arc::new(MockCardGateway::new(mode)),
        queue.clone(),
        false,
    );
    (gateway, queue, store)
}

/// Creates an order with a quote, an invoice and a card on file, ready
/// for a charge.
async fn billable_order(gateway: &ResilientOrderGateway) -> Order {
    let order = gateway.create(draft()).await.unwrap().value;
    let quote = calculate(&QuoteInput {
        wash_fold_weight_lbs: Some(10.0),
        ..QuoteInput::default()
    });
    let order = gateway
        .quote_order(order.id, &quote, Some(10.0), None, "staff")
        .await
        .unwrap()
        .value;
    let order = gateway
        .save_payment_method(
            order.id,
            NewPaymentMethod {
                user_email: order.user_email.clone(),
                card_token: "tok_test".to_string(),
                card_last4: "4242".to_string(),
                card_brand: "visa".to_string(),
                expiry_month: "12".to_string(),
                expiry_year: "2030".to_string(),
            },
        )
        .await
        .unwrap()
        .value;
    gateway.generate_invoice(order.id).await.unwrap();
    gateway.get(order.id).await.unwrap().value.unwrap()
}

#[tokio::test]
async fn successful_charge_finalizes_invoice_and_queues_receipt() {
    let (gateway, queue, store) = local_gateway(MockMode::AlwaysSucceed);
    let order = billable_order(&gateway).await;

    let result = gateway.attempt_payment(order.id, "staff").await.unwrap();
    assert!(result.value.succeeded);
    assert_eq!(result.value.amount_cents, 4000);
    assert_eq!(result.value.order.status, OrderStatus::Paid);
    assert_eq!(result.value.order.payment_status, PaymentStatus::Paid);

    let invoice = store.get_invoice(order.id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Final);

    let job = queue.next().await.expect("receipt job enqueued");
    assert_eq!(job.kind, JobKind::Receipt);
    assert_eq!(job.order_id, order.id);
    assert_eq!(job.amount_cents, Some(4000));
}

#[tokio::test]
async fn declined_charge_schedules_a_retry_and_unlocks_the_invoice() {
    let (gateway, queue, store) = local_gateway(MockMode::AlwaysDecline);
    let order = billable_order(&gateway).await;

    let result = gateway.attempt_payment(order.id, "staff").await.unwrap();
    assert!(!result.value.succeeded);
    assert_eq!(result.value.order.status, OrderStatus::PaymentFailed);
    assert!(result.value.next_retry_at.is_some());
    assert!(result.value.failure_reason.contains("declined"));

    let invoice = store.get_invoice(order.id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Draft);

    let attempt = store.last_attempt(order.id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert_eq!(attempt.attempt_number, 1);

    // Declines never produce a receipt.
    assert!(queue.next().await.is_none());
}

#[tokio::test]
async fn fourth_attempt_is_rejected_and_leaves_history_untouched() {
    let (gateway, _queue, store) = local_gateway(MockMode::AlwaysDecline);
    let order = billable_order(&gateway).await;

    for n in 1..=3 {
        let result = gateway.retry_payment(order.id, "staff").await.unwrap();
        assert!(!result.value.succeeded);
        let last = store.last_attempt(order.id).await.unwrap().unwrap();
        assert_eq!(last.attempt_number, n);
    }

    let err = gateway.retry_payment(order.id, "staff").await.unwrap_err();
    assert!(matches!(
        err,
        luma_store::GatewayError::Payment(PaymentError::MaxRetries(_))
    ));
    assert_eq!(store.list_attempts(order.id).await.unwrap().len(), 3);

    // First failure retries after 6h, the second after 24h, the third never.
    let attempts = store.list_attempts(order.id).await.unwrap();
    assert!(attempts[0].next_retry_at.is_some());
    assert!(attempts[1].next_retry_at.is_some());
    assert!(attempts[2].next_retry_at.is_none());
}

#[tokio::test]
async fn charges_carry_a_stable_idempotency_key() {
    let store = Arc::new(MemoryOrderStore::new());
    let queue = Arc::new(JobQueue::new());
    let card = Arc::new(MockCardGateway::new(MockMode::AlwaysDecline));
    let gateway = ResilientOrderGateway::new(None, store, card.clone(), queue, false);
    let order = billable_order(&gateway).await;

    gateway.attempt_payment(order.id, "staff").await.unwrap();
    gateway.retry_payment(order.id, "staff").await.unwrap();

    let keys = card.seen_keys.lock().unwrap().clone();
    let expected = format!("order-{}-amount-4000", order.id);
    assert_eq!(keys, vec![expected.clone(), expected]);
}

#[tokio::test]
async fn entering_ready_with_a_card_on_file_charges_automatically() {
    let (gateway, queue, store) = local_gateway(MockMode::AlwaysSucceed);
    let mut order = billable_order(&gateway).await;

    // Walk the order to Ready through the legal transitions.
    for status in [
        OrderStatus::InProgress,
        OrderStatus::Ready,
    ] {
        order = gateway
            .update_status(order.id, status, "staff")
            .await
            .unwrap()
            .value;
    }

    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    let invoice = store.get_invoice(order.id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Final);
    assert_eq!(queue.next().await.unwrap().kind, JobKind::Receipt);
}

#[tokio::test]
async fn approving_a_quote_then_ready_runs_the_charge() {
    let (gateway, queue, store) = local_gateway(MockMode::AlwaysSucceed);
    let order = gateway.create(draft()).await.unwrap().value;

    // 30 lbs is over the minimum, so the quote waits for sign-off.
    let quote = calculate(&QuoteInput {
        wash_fold_weight_lbs: Some(30.0),
        ..QuoteInput::default()
    });
    let order = gateway
        .quote_order(order.id, &quote, Some(30.0), None, "staff")
        .await
        .unwrap()
        .value;
    assert_eq!(order.status, OrderStatus::Quoted);
    assert_eq!(order.payment_status, PaymentStatus::ApprovalRequired);

    gateway
        .save_payment_method(
            order.id,
            NewPaymentMethod {
                user_email: order.user_email.clone(),
                card_token: "tok_test".to_string(),
                card_last4: "4242".to_string(),
                card_brand: "visa".to_string(),
                expiry_month: "12".to_string(),
                expiry_year: "2030".to_string(),
            },
        )
        .await
        .unwrap();

    let order = gateway
        .update_status(order.id, OrderStatus::Approved, "customer")
        .await
        .unwrap()
        .value;
    assert_eq!(order.payment_status, PaymentStatus::Approved);

    let mut order = order;
    for status in [OrderStatus::InProgress, OrderStatus::Ready] {
        order = gateway
            .update_status(order.id, status, "staff")
            .await
            .unwrap()
            .value;
    }

    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    let invoice = store.get_invoice(order.id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Final);
    assert_eq!(invoice.total_cents, 6000);
    assert_eq!(queue.next().await.unwrap().kind, JobKind::Receipt);
}

#[tokio::test]
async fn status_push_cannot_enter_quoted_without_a_quote() {
    let (gateway, _queue, _store) = local_gateway(MockMode::AlwaysSucceed);
    let order = gateway.create(draft()).await.unwrap().value;

    for status in [OrderStatus::PickedUp, OrderStatus::WeighedOrCounted] {
        gateway.update_status(order.id, status, "staff").await.unwrap();
    }

    let err = gateway
        .update_status(order.id, OrderStatus::Quoted, "staff")
        .await
        .unwrap_err();
    assert!(matches!(err, luma_store::GatewayError::Transition(_)));

    let stored = gateway.get(order.id).await.unwrap().value.unwrap();
    assert_eq!(stored.status, OrderStatus::WeighedOrCounted);
    assert!(stored.quote_amount_cents.is_none());
}

#[tokio::test]
async fn payment_failure_never_blocks_the_ready_transition() {
    let (gateway, _queue, _store) = local_gateway(MockMode::AlwaysDecline);
    let mut order = billable_order(&gateway).await;

    for status in [OrderStatus::InProgress, OrderStatus::Ready] {
        order = gateway
            .update_status(order.id, status, "staff")
            .await
            .unwrap()
            .value;
    }

    // The charge failed but the transition itself stood.
    assert_eq!(order.status, OrderStatus::PaymentFailed);
    assert_eq!(order.payment_status, PaymentStatus::PaymentFailed);
}

#[tokio::test]
async fn cancel_is_rejected_after_pickup() {
    let (gateway, _queue, _store) = local_gateway(MockMode::AlwaysSucceed);
    let order = gateway.create(draft()).await.unwrap().value;

    gateway
        .update_status(order.id, OrderStatus::PickedUp, "staff")
        .await
        .unwrap();
    let err = gateway
        .update_status(order.id, OrderStatus::Cancelled, "customer")
        .await
        .unwrap_err();
    assert!(matches!(err, luma_store::GatewayError::Transition(_)));
}

// ---------------------------------------------------------------------------
// Remote fallback behavior
// ---------------------------------------------------------------------------

/// Remote stub that is always down.
struct DownRemote;

macro_rules! unavailable {
    () => {
        Err(RemoteError::Unavailable("connection refused".to_string()))
    };
}

#[async_trait]
impl RemoteOrders for DownRemote {
    async fn create_order(&self, _d: &NewOrder) -> Result<Order, RemoteError> {
        unavailable!()
    }
    async fn get_order(&self, _id: i64) -> Result<Option<Order>, RemoteError> {
        unavailable!()
    }
    async fn update_status(
        &self,
        _id: i64,
        _s: OrderStatus,
        _a: &str,
    ) -> Result<Order, RemoteError> {
        unavailable!()
    }
    async fn update_payment_status(
        &self,
        _id: i64,
        _s: PaymentStatus,
    ) -> Result<Order, RemoteError> {
        unavailable!()
    }
    async fn update_admin_notes(&self, _id: i64, _n: &str) -> Result<Order, RemoteError> {
        unavailable!()
    }
    async fn delete_order(&self, _id: i64) -> Result<bool, RemoteError> {
        unavailable!()
    }
    async fn list_by_user(&self, _e: &str) -> Result<Vec<Order>, RemoteError> {
        unavailable!()
    }
    async fn list_admin(
        &self,
        _s: Option<OrderStatus>,
        _q: Option<&str>,
    ) -> Result<Vec<Order>, RemoteError> {
        unavailable!()
    }
    async fn save_payment_method(
        &self,
        _id: i64,
        _m: &NewPaymentMethod,
    ) -> Result<Order, RemoteError> {
        unavailable!()
    }
    async fn generate_invoice(&self, _id: i64) -> Result<luma_order::models::Invoice, RemoteError> {
        unavailable!()
    }
    async fn get_invoice(
        &self,
        _id: i64,
    ) -> Result<Option<luma_order::models::Invoice>, RemoteError> {
        unavailable!()
    }
    async fn attempt_payment(&self, _id: i64) -> Result<ChargeSummary, RemoteError> {
        unavailable!()
    }
    async fn retry_payment(&self, _id: i64) -> Result<ChargeSummary, RemoteError> {
        unavailable!()
    }
}

/// Remote stub that answers every listing with nothing.
struct EmptyRemote;

#[async_trait]
impl RemoteOrders for EmptyRemote {
    async fn create_order(&self, _d: &NewOrder) -> Result<Order, RemoteError> {
        unavailable!()
    }
    async fn get_order(&self, _id: i64) -> Result<Option<Order>, RemoteError> {
        Ok(None)
    }
    async fn update_status(
        &self,
        _id: i64,
        _s: OrderStatus,
        _a: &str,
    ) -> Result<Order, RemoteError> {
        unavailable!()
    }
    async fn update_payment_status(
        &self,
        _id: i64,
        _s: PaymentStatus,
    ) -> Result<Order, RemoteError> {
        unavailable!()
    }
    async fn update_admin_notes(&self, _id: i64, _n: &str) -> Result<Order, RemoteError> {
        unavailable!()
    }
    async fn delete_order(&self, _id: i64) -> Result<bool, RemoteError> {
        Ok(false)
    }
    async fn list_by_user(&self, _e: &str) -> Result<Vec<Order>, RemoteError> {
        Ok(vec![])
    }
    async fn list_admin(
        &self,
        _s: Option<OrderStatus>,
        _q: Option<&str>,
    ) -> Result<Vec<Order>, RemoteError> {
        Ok(vec![])
    }
    async fn save_payment_method(
        &self,
        _id: i64,
        _m: &NewPaymentMethod,
    ) -> Result<Order, RemoteError> {
        unavailable!()
    }
    async fn generate_invoice(&self, _id: i64) -> Result<luma_order::models::Invoice, RemoteError> {
        unavailable!()
    }
    async fn get_invoice(
        &self,
        _id: i64,
    ) -> Result<Option<luma_order::models::Invoice>, RemoteError> {
        Ok(None)
    }
    async fn attempt_payment(&self, _id: i64) -> Result<ChargeSummary, RemoteError> {
        unavailable!()
    }
    async fn retry_payment(&self, _id: i64) -> Result<ChargeSummary, RemoteError> {
        unavailable!()
    }
}

/// Remote stub that applies status updates to a canned order.
struct UpRemote {
    order: Order,
}

#[async_trait]
impl RemoteOrders for UpRemote {
    async fn create_order(&self, _d: &NewOrder) -> Result<Order, RemoteError> {
        Ok(self.order.clone())
    }
    async fn get_order(&self, _id: i64) -> Result<Option<Order>, RemoteError> {
        Ok(Some(self.order.clone()))
    }
    async fn update_status(
        &self,
        _id: i64,
        status: OrderStatus,
        _a: &str,
    ) -> Result<Order, RemoteError> {
        let mut order = self.order.clone();
        order.status = status;
        Ok(order)
    }
    async fn update_payment_status(
        &self,
        _id: i64,
        payment_status: PaymentStatus,
    ) -> Result<Order, RemoteError> {
        let mut order = self.order.clone();
        order.payment_status = payment_status;
        Ok(order)
    }
    async fn update_admin_notes(&self, _id: i64, notes: &str) -> Result<Order, RemoteError> {
        let mut order = self.order.clone();
        order.admin_notes = notes.to_string();
        Ok(order)
    }
    async fn delete_order(&self, _id: i64) -> Result<bool, RemoteError> {
        Ok(true)
    }
    async fn list_by_user(&self, _e: &str) -> Result<Vec<Order>, RemoteError> {
        Ok(vec![self.order.clone()])
    }
    async fn list_admin(
        &self,
        _s: Option<OrderStatus>,
        _q: Option<&str>,
    ) -> Result<Vec<Order>, RemoteError> {
        Ok(vec![self.order.clone()])
    }
    async fn save_payment_method(
        &self,
        _id: i64,
        _m: &NewPaymentMethod,
    ) -> Result<Order, RemoteError> {
        Ok(self.order.clone())
    }
    async fn generate_invoice(&self, _id: i64) -> Result<luma_order::models::Invoice, RemoteError> {
        unavailable!()
    }
    async fn get_invoice(
        &self,
        _id: i64,
    ) -> Result<Option<luma_order::models::Invoice>, RemoteError> {
        Ok(None)
    }
    async fn attempt_payment(&self, _id: i64) -> Result<ChargeSummary, RemoteError> {
        unavailable!()
    }
    async fn retry_payment(&self, _id: i64) -> Result<ChargeSummary, RemoteError> {
        unavailable!()
    }
}

fn gateway_with_remote(
    remote: Arc<dyn RemoteOrders>,
    remote_only: bool,
) -> (ResilientOrderGateway, Arc<MemoryOrderStore>) {
    let store = Arc::new(MemoryOrderStore::new());
    let gateway = ResilientOrderGateway::new(
        Some(remote),
        store.clone(),
        Arc::new(MockCardGateway::new(MockMode::AlwaysSucceed)),
        Arc::new(JobQueue::new()),
        remote_only,
    );
    (gateway, store)
}

#[tokio::test]
async fn unavailable_remote_falls_back_to_the_local_store() {
    let (gateway, store) = gateway_with_remote(Arc::new(DownRemote), false);

    let created = gateway.create(draft()).await.unwrap();
    assert!(created.degraded);
    assert!(store.get_order(created.value.id).await.unwrap().is_some());

    let fetched = gateway.get(created.value.id).await.unwrap();
    assert!(fetched.degraded);
    assert_eq!(fetched.value.unwrap().id, created.value.id);
}

#[tokio::test]
async fn remote_only_mode_surfaces_the_outage_instead_of_degrading() {
    let (gateway, store) = gateway_with_remote(Arc::new(DownRemote), true);

    let err = gateway.create(draft()).await.unwrap_err();
    assert!(matches!(err, luma_store::GatewayError::Unavailable(_)));
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn remote_writes_are_mirrored_into_the_local_store() {
    let canned = Order::new(1, draft());
    let (gateway, store) = gateway_with_remote(Arc::new(UpRemote { order: canned }), false);

    let updated = gateway
        .update_status(1, OrderStatus::PickedUp, "staff")
        .await
        .unwrap();
    assert!(!updated.degraded);

    // A later outage now serves the post-update order, not stale state.
    let mirrored = store.get_order(1).await.unwrap().unwrap();
    assert_eq!(mirrored.status, OrderStatus::PickedUp);

    gateway
        .update_admin_notes(1, "gate code 4411", "admin")
        .await
        .unwrap();
    let mirrored = store.get_order(1).await.unwrap().unwrap();
    assert_eq!(mirrored.admin_notes, "gate code 4411");
}

#[tokio::test]
async fn empty_unfiltered_remote_listing_prefers_nonempty_local_data() {
    let (gateway, store) = gateway_with_remote(Arc::new(EmptyRemote), false);
    store.create_order(draft()).await.unwrap();

    let listed = gateway.list_admin(None, None).await.unwrap();
    assert!(listed.degraded);
    assert_eq!(listed.value.len(), 1);

    // A filtered query takes the remote's answer at face value.
    let filtered = gateway
        .list_admin(Some(OrderStatus::PendingPickup), None)
        .await
        .unwrap();
    assert!(!filtered.degraded);
    assert!(filtered.value.is_empty());
}
