use std::sync::Arc;

use chrono::{Duration, Utc};
use luma_core::payment::{CardGateway, ChargeRequest, IntentStatus, PaymentIntent, WebhookEventKind};
use luma_core::BoxError;

use crate::lifecycle::AuditEvent;
use crate::models::{
    AttemptStatus, Invoice, InvoiceStatus, Order, OrderStatus, PaymentAttempt, PaymentMethod,
    PaymentStatus,
};
use crate::repository::{NewAttempt, NotificationSink, OrderRepository};

const MAX_ATTEMPTS: i32 = 3;
const FIRST_RETRY_DELAY_HOURS: i64 = 6;
const LATER_RETRY_DELAY_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Invoice not generated for order {0}")]
    InvoiceMissing(i64),

    #[error("No payment method on file for order {0}")]
    NoPaymentMethod(i64),

    #[error("Maximum retry attempts reached for order {0}")]
    MaxRetries(i64),

    #[error("Store error: {0}")]
    Store(String),
}

fn store_err(e: BoxError) -> PaymentError {
    PaymentError::Store(e.to_string())
}

#[derive(Debug)]
pub struct PaymentOutcome {
    pub order: Order,
    pub attempt: PaymentAttempt,
    pub events: Vec<AuditEvent>,
}

impl PaymentOutcome {
    pub fn succeeded(&self) -> bool {
        self.attempt.status == AttemptStatus::Success
    }
}

/// Drives the payment-attempt/retry workflow against an external card
/// gateway. Declines and gateway outages are converted into failed
/// attempts and audit events; they never abort the surrounding status
/// transition.
pub struct PaymentOrchestrator {
    store: Arc<dyn OrderRepository>,
    gateway: Arc<dyn CardGateway>,
    notifier: Arc<dyn NotificationSink>,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn OrderRepository>,
        gateway: Arc<dyn CardGateway>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
        }
    }

    /// Precondition: the order has an invoice and a payment method on file.
    /// The invoice is locked for the duration of the attempt.
    pub async fn attempt_payment(
        &self,
        order_id: i64,
        actor: &str,
    ) -> Result<PaymentOutcome, PaymentError> {
        let (order, invoice, method) = self.load_billing_context(order_id).await?;
        self.guard_attempt_cap(order_id).await?;
        self.run_attempt(order, invoice, method, actor).await
    }

    /// Same mechanics as `attempt_payment`, capped at 3 total attempts.
    /// A 4th attempt is rejected terminally; prior attempts are untouched.
    pub async fn retry_payment(
        &self,
        order_id: i64,
        actor: &str,
    ) -> Result<PaymentOutcome, PaymentError> {
        self.attempt_payment(order_id, actor).await
    }

    async fn guard_attempt_cap(&self, order_id: i64) -> Result<(), PaymentError> {
        let last = self
            .store
            .last_attempt(order_id)
            .await
            .map_err(store_err)?;
        if last.map(|a| a.attempt_number).unwrap_or(0) >= MAX_ATTEMPTS {
            return Err(PaymentError::MaxRetries(order_id));
        }
        Ok(())
    }

    async fn load_billing_context(
        &self,
        order_id: i64,
    ) -> Result<(Order, Invoice, PaymentMethod), PaymentError> {
        let order = self
            .store
            .get_order(order_id)
            .await
            .map_err(store_err)?
            .ok_or(PaymentError::OrderNotFound(order_id))?;
        let invoice = self
            .store
            .get_invoice(order_id)
            .await
            .map_err(store_err)?
            .ok_or(PaymentError::InvoiceMissing(order_id))?;
        let method_id = order
            .payment_method_id
            .ok_or(PaymentError::NoPaymentMethod(order_id))?;
        let method = self
            .store
            .get_payment_method(method_id)
            .await
            .map_err(store_err)?
            .ok_or(PaymentError::NoPaymentMethod(order_id))?;
        Ok((order, invoice, method))
    }

    async fn run_attempt(
        &self,
        mut order: Order,
        mut invoice: Invoice,
        method: PaymentMethod,
        actor: &str,
    ) -> Result<PaymentOutcome, PaymentError> {
        let mut events = Vec::new();
        let order_id = order.id;

        invoice.lock();
        self.store.save_invoice(&invoice).await.map_err(store_err)?;

        let request = ChargeRequest {
            order_id,
            amount_cents: invoice.total_cents,
            currency: order.currency.clone(),
            card_token: method.card_token.clone(),
        };

        let charge = self.gateway.charge(&request).await;

        let mut attempt = NewAttempt {
            order_id,
            invoice_id: Some(invoice.id),
            status: AttemptStatus::Pending,
            amount_cents: invoice.total_cents,
            failure_reason: String::new(),
            transaction_id: String::new(),
            next_retry_at: None,
        };

        match charge {
            Ok(intent) if intent.status == IntentStatus::Succeeded => {
                attempt.status = AttemptStatus::Success;
                attempt.transaction_id = intent
                    .transaction_id
                    .clone()
                    .unwrap_or_else(|| intent.id.clone());
                invoice.finalize();
                order.payment_intent_id = Some(intent.id);
                let from = order.status;
                order.status = OrderStatus::Paid;
                order.payment_status = PaymentStatus::Paid;
                order.touch();
                events.push(AuditEvent::transition(
                    order_id,
                    "Payment Received",
                    actor,
                    from,
                    OrderStatus::Paid,
                ));
            }
            Ok(intent) if intent.status == IntentStatus::Processing => {
                // Terminal signal will arrive via webhook; invoice stays
                // locked until it does.
                order.payment_intent_id = Some(intent.id);
                let from = order.status;
                order.status = OrderStatus::ChargeAttempted;
                order.payment_status = PaymentStatus::ChargeAttempted;
                order.touch();
                events.push(AuditEvent::transition(
                    order_id,
                    "Charge Attempted",
                    actor,
                    from,
                    OrderStatus::ChargeAttempted,
                ));
            }
            Ok(intent) if intent.status == IntentStatus::RequiresAction => {
                attempt.status = AttemptStatus::Failed;
                attempt.failure_reason = "Customer authentication required".to_string();
                invoice.status = InvoiceStatus::Draft;
                order.payment_intent_id = Some(intent.id);
                let from = order.status;
                order.status = OrderStatus::PaymentActionRequired;
                order.payment_status = PaymentStatus::PaymentActionRequired;
                order.touch();
                events.push(AuditEvent::transition(
                    order_id,
                    "Payment Action Required",
                    actor,
                    from,
                    OrderStatus::PaymentActionRequired,
                ));
            }
            Ok(intent) => {
                self.mark_declined(&mut order, &mut invoice, &mut attempt, &intent)
                    .await?;
                events.push(AuditEvent::note(
                    order_id,
                    "Payment Attempt Failed",
                    actor,
                    attempt.failure_reason.clone(),
                ));
            }
            Err(e) => {
                tracing::warn!(order_id, error = %e, "card gateway unreachable during charge");
                attempt.status = AttemptStatus::Failed;
                attempt.failure_reason = format!("Gateway unavailable: {e}");
                attempt.next_retry_at = self.next_retry_at(order_id).await?;
                invoice.status = InvoiceStatus::Draft;
                let from = order.status;
                order.status = OrderStatus::PaymentFailed;
                order.payment_status = PaymentStatus::PaymentFailed;
                order.touch();
                events.push(AuditEvent::transition(
                    order_id,
                    "Payment Attempt Failed",
                    actor,
                    from,
                    OrderStatus::PaymentFailed,
                ));
            }
        }

        let recorded = self.store.append_attempt(attempt).await.map_err(store_err)?;
        self.store.save_invoice(&invoice).await.map_err(store_err)?;
        self.store.save_order(&order).await.map_err(store_err)?;

        if recorded.status == AttemptStatus::Success {
            if let Err(e) = self
                .notifier
                .receipt(&order, recorded.amount_cents, &recorded.transaction_id)
                .await
            {
                tracing::warn!(order_id, error = %e, "failed to queue receipt email");
            }
        }

        Ok(PaymentOutcome {
            order,
            attempt: recorded,
            events,
        })
    }

    async fn mark_declined(
        &self,
        order: &mut Order,
        invoice: &mut Invoice,
        attempt: &mut NewAttempt,
        intent: &PaymentIntent,
    ) -> Result<(), PaymentError> {
        attempt.status = AttemptStatus::Failed;
        attempt.failure_reason = intent
            .failure_reason
            .clone()
            .unwrap_or_else(|| "Card declined".to_string());
        attempt.next_retry_at = self.next_retry_at(order.id).await?;
        invoice.status = InvoiceStatus::Draft;
        order.payment_intent_id = Some(intent.id.clone());
        order.status = OrderStatus::PaymentFailed;
        order.payment_status = PaymentStatus::PaymentFailed;
        order.touch();
        Ok(())
    }

    /// 6 hours after the first failure, 24 after a retry failure, none once
    /// the cap is reached.
    async fn next_retry_at(
        &self,
        order_id: i64,
    ) -> Result<Option<chrono::DateTime<Utc>>, PaymentError> {
        let prior = self
            .store
            .last_attempt(order_id)
            .await
            .map_err(store_err)?
            .map(|a| a.attempt_number)
            .unwrap_or(0);
        let this_attempt = prior + 1;
        Ok(match this_attempt {
            1 => Some(Utc::now() + Duration::hours(FIRST_RETRY_DELAY_HOURS)),
            n if n < MAX_ATTEMPTS => Some(Utc::now() + Duration::hours(LATER_RETRY_DELAY_HOURS)),
            _ => None,
        })
    }

    /// Gateway webhook callbacks are the authoritative terminal signal.
    /// Resolution is by stored intent reference first, falling back to the
    /// metadata-carried order id.
    pub async fn handle_webhook(
        &self,
        kind: WebhookEventKind,
        intent_id: &str,
        metadata_order_id: Option<i64>,
    ) -> Result<Option<Order>, PaymentError> {
        let mut order = match self
            .store
            .find_by_intent(intent_id)
            .await
            .map_err(store_err)?
        {
            Some(order) => order,
            None => match metadata_order_id {
                Some(id) => match self.store.get_order(id).await.map_err(store_err)? {
                    Some(order) => order,
                    None => return Ok(None),
                },
                None => return Ok(None),
            },
        };

        let from = order.status;
        order.payment_intent_id = Some(intent_id.to_string());
        let (status, payment_status, action) = match kind {
            WebhookEventKind::Succeeded => {
                if let Some(mut invoice) =
                    self.store.get_invoice(order.id).await.map_err(store_err)?
                {
                    invoice.finalize();
                    self.store.save_invoice(&invoice).await.map_err(store_err)?;
                }
                (OrderStatus::Paid, PaymentStatus::Paid, "Payment Received")
            }
            WebhookEventKind::Failed => (
                OrderStatus::PaymentFailed,
                PaymentStatus::PaymentFailed,
                "Payment Failed",
            ),
            WebhookEventKind::Processing => (
                OrderStatus::ChargeAttempted,
                PaymentStatus::ChargeAttempted,
                "Charge Processing",
            ),
            WebhookEventKind::RequiresAction => (
                OrderStatus::PaymentActionRequired,
                PaymentStatus::PaymentActionRequired,
                "Payment Action Required",
            ),
        };
        order.status = status;
        order.payment_status = payment_status;
        order.touch();
        self.store.save_order(&order).await.map_err(store_err)?;
        crate::audit::record(&AuditEvent::transition(
            order.id, action, "webhook", from, status,
        ));

        Ok(Some(order))
    }
}

/// Mock gateway used in tests and when no external gateway is configured.
pub struct MockCardGateway {
    mode: MockMode,
    pub seen_keys: std::sync::Mutex<Vec<String>>,
}

#[derive(Debug, Clone, Copy)]
pub enum MockMode {
    AlwaysSucceed,
    AlwaysDecline,
    /// Success probability in percent, resolved per charge.
    SucceedPercent(u8),
}

impl MockCardGateway {
    pub fn new(mode: MockMode) -> Self {
        Self {
            mode,
            seen_keys: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for MockCardGateway {
    fn default() -> Self {
        Self::new(MockMode::SucceedPercent(80))
    }
}

#[async_trait::async_trait]
impl CardGateway for MockCardGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentIntent, BoxError> {
        self.seen_keys
            .lock()
            .expect("mock gateway lock")
            .push(request.idempotency_key());

        let succeeded = match self.mode {
            MockMode::AlwaysSucceed => true,
            MockMode::AlwaysDecline => false,
            MockMode::SucceedPercent(p) => rand::random::<u8>() % 100 < p,
        };

        let now = Utc::now();
        if succeeded {
            Ok(PaymentIntent {
                id: format!("mock_pi_{}", request.idempotency_key()),
                order_id: request.order_id,
                amount_cents: request.amount_cents,
                currency: request.currency.clone(),
                status: IntentStatus::Succeeded,
                transaction_id: Some(format!("txn_{}", now.timestamp_nanos_opt().unwrap_or(0))),
                failure_reason: None,
                created_at: now,
            })
        } else {
            Ok(PaymentIntent {
                id: format!("mock_pi_{}", request.idempotency_key()),
                order_id: request.order_id,
                amount_cents: request.amount_cents,
                currency: request.currency.clone(),
                status: IntentStatus::Failed,
                transaction_id: None,
                failure_reason: Some("Card declined - insufficient funds".to_string()),
                created_at: now,
            })
        }
    }

    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, BoxError> {
        Ok(PaymentIntent {
            id: intent_id.to_string(),
            order_id: 0,
            amount_cents: 0,
            currency: "usd".to_string(),
            status: IntentStatus::Succeeded,
            transaction_id: None,
            failure_reason: None,
            created_at: Utc::now(),
        })
    }
}
