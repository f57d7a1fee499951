use std::sync::Arc;

use luma_core::payment::CardGateway;
use luma_order::audit;
use luma_order::lifecycle::{self, AuditEvent, TransitionError};
use luma_order::models::{Invoice, NewOrder, Order, OrderStatus, PaymentStatus};
use luma_order::orchestrator::{PaymentError, PaymentOrchestrator};
use luma_order::repository::{NewPaymentMethod, NotificationSink, OrderRepository};
use luma_pricing::{PricingType, Quote};

use crate::jobs::JobQueue;
use crate::memory::MemoryOrderStore;
use crate::remote::{ChargeSummary, RemoteError, RemoteOrders};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Order not found: {0}")]
    NotFound(i64),

    #[error("Order service temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Remote order service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Store error: {0}")]
    Store(String),
}

fn store_err(e: luma_core::BoxError) -> GatewayError {
    GatewayError::Store(e.to_string())
}

/// A gateway answer plus where it came from. `degraded` is set only when
/// a configured remote failed and the local store answered instead.
#[derive(Debug, Clone)]
pub struct GatewayResponse<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> GatewayResponse<T> {
    fn remote(value: T) -> Self {
        Self {
            value,
            degraded: false,
        }
    }
}

/// Single order-access facade: every operation is tried against the
/// remote order service first and falls back to the in-process store
/// when the remote is unavailable. With no remote configured the local
/// store is authoritative and nothing is degraded.
pub struct ResilientOrderGateway {
    remote: Option<Arc<dyn RemoteOrders>>,
    local: Arc<MemoryOrderStore>,
    orchestrator: PaymentOrchestrator,
    remote_only: bool,
}

impl ResilientOrderGateway {
    pub fn new(
        remote: Option<Arc<dyn RemoteOrders>>,
        local: Arc<MemoryOrderStore>,
        card_gateway: Arc<dyn CardGateway>,
        notifier: Arc<JobQueue>,
        remote_only: bool,
    ) -> Self {
        let orchestrator = PaymentOrchestrator::new(
            local.clone() as Arc<dyn OrderRepository>,
            card_gateway,
            notifier as Arc<dyn NotificationSink>,
        );
        Self {
            remote,
            local,
            orchestrator,
            remote_only,
        }
    }

    /// Exposed for webhook handling; webhooks always apply locally.
    pub fn orchestrator(&self) -> &PaymentOrchestrator {
        &self.orchestrator
    }

    pub fn local_store(&self) -> &Arc<MemoryOrderStore> {
        &self.local
    }

    /// Definitive rejections and remote-only mode surface immediately;
    /// otherwise returns the message for the fallback log line.
    fn fallback_allowed(&self, err: RemoteError) -> Result<String, GatewayError> {
        match err {
            RemoteError::Rejected { status, message } => {
                Err(GatewayError::Rejected { status, message })
            }
            RemoteError::Unavailable(msg) => {
                if self.remote_only {
                    Err(GatewayError::Unavailable(msg))
                } else {
                    Ok(msg)
                }
            }
        }
    }

    fn local_degraded(&self) -> bool {
        self.remote.is_some()
    }

    /// Keeps the local store current after a remote write so a later
    /// outage does not serve pre-update state.
    async fn mirror_local(&self, order: &Order) {
        if let Err(e) = self.local.save_order(order).await {
            tracing::warn!(order_id = order.id, error = %e,
                "local mirror write failed after remote update");
        }
    }

    pub async fn create(
        &self,
        draft: NewOrder,
    ) -> Result<GatewayResponse<Order>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.create_order(&draft).await {
                Ok(order) => {
                    // Creation already happened remotely; a failed mirror
                    // write must not trigger a second create.
                    if let Err(e) = self.local.save_order(&order).await {
                        tracing::warn!(order_id = order.id, error = %e,
                            "remote create succeeded but local mirror write failed");
                    }
                    return Ok(GatewayResponse::remote(order));
                }
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(error = %msg, "remote create failed; creating locally");
                }
            }
        }

        let order = self.local.create_order(draft).await.map_err(store_err)?;
        Ok(GatewayResponse {
            value: order,
            degraded: self.local_degraded(),
        })
    }

    pub async fn get(&self, id: i64) -> Result<GatewayResponse<Option<Order>>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.get_order(id).await {
                Ok(order) => return Ok(GatewayResponse::remote(order)),
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(order_id = id, error = %msg,
                        "remote read failed; serving from local store");
                }
            }
        }
        let order = self.local.get_order(id).await.map_err(store_err)?;
        Ok(GatewayResponse {
            value: order,
            degraded: self.local_degraded(),
        })
    }

    pub async fn update_status(
        &self,
        id: i64,
        to: OrderStatus,
        actor: &str,
    ) -> Result<GatewayResponse<Order>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.update_status(id, to, actor).await {
                Ok(order) => {
                    self.mirror_local(&order).await;
                    return Ok(GatewayResponse::remote(order));
                }
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(order_id = id, error = %msg,
                        "remote status update failed; applying locally");
                }
            }
        }

        let mut order = self.require_local(id).await?;
        let outcome = lifecycle::apply_status(&mut order, to, actor)?;
        self.local.save_order(&order).await.map_err(store_err)?;
        audit::record(&outcome.event);

        if outcome.triggers_payment {
            order = self.charge_on_ready(order, actor).await?;
        }

        Ok(GatewayResponse {
            value: order,
            degraded: self.local_degraded(),
        })
    }

    /// Invoicing and charging ride along with the Ready transition. A
    /// billing failure here becomes an audit entry and a warn log; it
    /// never rolls the status change back.
    async fn charge_on_ready(&self, order: Order, actor: &str) -> Result<Order, GatewayError> {
        let order_id = order.id;
        match self.ensure_local_invoice(&order).await {
            Ok(_) => match self.orchestrator.attempt_payment(order_id, actor).await {
                Ok(outcome) => {
                    audit::record_all(&outcome.events);
                    return Ok(outcome.order);
                }
                Err(e) => {
                    tracing::warn!(order_id, error = %e, "automatic charge on Ready failed");
                    audit::record(&AuditEvent::note(
                        order_id,
                        "Payment Attempt Failed",
                        actor,
                        e.to_string(),
                    ));
                }
            },
            Err(e) => {
                tracing::warn!(order_id, error = %e, "invoice generation on Ready failed");
                audit::record(&AuditEvent::note(
                    order_id,
                    "Invoice Generation Failed",
                    actor,
                    e.to_string(),
                ));
            }
        }
        // The primary status change stands; hand back the stored order.
        self.require_local(order_id).await
    }

    pub async fn update_payment_status(
        &self,
        id: i64,
        payment_status: PaymentStatus,
        actor: &str,
    ) -> Result<GatewayResponse<Order>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.update_payment_status(id, payment_status).await {
                Ok(order) => {
                    self.mirror_local(&order).await;
                    return Ok(GatewayResponse::remote(order));
                }
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(order_id = id, error = %msg,
                        "remote payment-status update failed; applying locally");
                }
            }
        }

        let mut order = self.require_local(id).await?;
        order.payment_status = payment_status;
        order.touch();
        self.local.save_order(&order).await.map_err(store_err)?;
        audit::record(&AuditEvent::note(
            id,
            "Payment Status Changed",
            actor,
            format!("{:?}", payment_status),
        ));
        Ok(GatewayResponse {
            value: order,
            degraded: self.local_degraded(),
        })
    }

    pub async fn update_admin_notes(
        &self,
        id: i64,
        notes: &str,
        actor: &str,
    ) -> Result<GatewayResponse<Order>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.update_admin_notes(id, notes).await {
                Ok(order) => {
                    self.mirror_local(&order).await;
                    return Ok(GatewayResponse::remote(order));
                }
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(order_id = id, error = %msg,
                        "remote notes update failed; applying locally");
                }
            }
        }

        let mut order = self.require_local(id).await?;
        order.admin_notes = notes.to_string();
        order.touch();
        self.local.save_order(&order).await.map_err(store_err)?;
        audit::record(&AuditEvent::note(
            id,
            "Admin Notes Updated",
            actor,
            String::new(),
        ));
        Ok(GatewayResponse {
            value: order,
            degraded: self.local_degraded(),
        })
    }

    pub async fn delete(&self, id: i64) -> Result<GatewayResponse<bool>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.delete_order(id).await {
                Ok(deleted) => {
                    // Keep the mirror from resurrecting the order later.
                    if let Err(e) = self.local.delete_order(id).await {
                        tracing::warn!(order_id = id, error = %e,
                            "local mirror delete failed after remote delete");
                    }
                    return Ok(GatewayResponse::remote(deleted));
                }
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(order_id = id, error = %msg,
                        "remote delete failed; deleting locally");
                }
            }
        }
        let deleted = self.local.delete_order(id).await.map_err(store_err)?;
        Ok(GatewayResponse {
            value: deleted,
            degraded: self.local_degraded(),
        })
    }

    pub async fn list_by_user(
        &self,
        user_email: &str,
    ) -> Result<GatewayResponse<Vec<Order>>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.list_by_user(user_email).await {
                Ok(orders) => return Ok(GatewayResponse::remote(orders)),
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(error = %msg, "remote user listing failed; using local store");
                }
            }
        }
        let orders = self.local.list_by_user(user_email).await.map_err(store_err)?;
        Ok(GatewayResponse {
            value: orders,
            degraded: self.local_degraded(),
        })
    }

    /// Admin listing. For the unfiltered query an empty remote answer is
    /// indistinguishable from a degraded remote, so non-empty local data
    /// wins over remote emptiness.
    pub async fn list_admin(
        &self,
        status: Option<OrderStatus>,
        search: Option<&str>,
    ) -> Result<GatewayResponse<Vec<Order>>, GatewayError> {
        let unfiltered = status.is_none() && search.map(|s| s.trim().is_empty()).unwrap_or(true);

        if let Some(remote) = &self.remote {
            match remote.list_admin(status, search).await {
                Ok(orders) => {
                    if unfiltered && orders.is_empty() && !self.remote_only {
                        let local = self.local.list_all().await.map_err(store_err)?;
                        if !local.is_empty() {
                            tracing::warn!(
                                local_count = local.len(),
                                "remote returned no orders while local store has data; preferring local"
                            );
                            return Ok(GatewayResponse {
                                value: local,
                                degraded: true,
                            });
                        }
                    }
                    return Ok(GatewayResponse::remote(orders));
                }
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(error = %msg, "remote admin listing failed; using local store");
                }
            }
        }

        let orders = self.filtered_local(status, search).await?;
        Ok(GatewayResponse {
            value: orders,
            degraded: self.local_degraded(),
        })
    }

    async fn filtered_local(
        &self,
        status: Option<OrderStatus>,
        search: Option<&str>,
    ) -> Result<Vec<Order>, GatewayError> {
        let mut orders = self.local.list_all().await.map_err(store_err)?;
        if let Some(status) = status {
            orders.retain(|o| o.status == status);
        }
        if let Some(search) = search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() {
                orders.retain(|o| {
                    o.id.to_string() == needle
                        || o.user_email.contains(&needle)
                        || o.address_display().to_lowercase().contains(&needle)
                });
            }
        }
        Ok(orders)
    }

    pub async fn save_payment_method(
        &self,
        id: i64,
        method: NewPaymentMethod,
    ) -> Result<GatewayResponse<Order>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.save_payment_method(id, &method).await {
                Ok(order) => {
                    self.mirror_local(&order).await;
                    return Ok(GatewayResponse::remote(order));
                }
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(order_id = id, error = %msg,
                        "remote payment-method save failed; saving locally");
                }
            }
        }

        let order = self
            .local
            .attach_payment_method(id, method)
            .await
            .map_err(store_err)?
            .ok_or(GatewayError::NotFound(id))?;
        audit::record(&AuditEvent::note(
            id,
            "Payment Method Saved",
            &order.user_email,
            String::new(),
        ));
        Ok(GatewayResponse {
            value: order,
            degraded: self.local_degraded(),
        })
    }

    /// Attaches a computed quote to the order. Quoting always runs in
    /// process; the remote mirror picks the result up on the next status
    /// push.
    pub async fn quote_order(
        &self,
        id: i64,
        quote: &Quote,
        bag_weight_lbs: Option<f64>,
        pricing_type: Option<PricingType>,
        actor: &str,
    ) -> Result<GatewayResponse<Order>, GatewayError> {
        let mut order = self.require_order_anywhere(id).await?;
        if let Some(weight) = bag_weight_lbs {
            order.bag_weight_lbs = Some(weight);
        }
        if let Some(pt) = pricing_type {
            order.pricing_type = pt;
        }
        let event = lifecycle::apply_quote(&mut order, quote, actor)?;
        self.local.save_order(&order).await.map_err(store_err)?;
        audit::record(&event);
        Ok(GatewayResponse {
            value: order,
            degraded: false,
        })
    }

    pub async fn generate_invoice(
        &self,
        id: i64,
    ) -> Result<GatewayResponse<Invoice>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.generate_invoice(id).await {
                Ok(invoice) => return Ok(GatewayResponse::remote(invoice)),
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(order_id = id, error = %msg,
                        "remote invoice generation failed; generating locally");
                }
            }
        }

        let order = self.require_order_anywhere(id).await?;
        let invoice = self.ensure_local_invoice(&order).await?;
        Ok(GatewayResponse {
            value: invoice,
            degraded: self.local_degraded(),
        })
    }

    async fn ensure_local_invoice(&self, order: &Order) -> Result<Invoice, GatewayError> {
        if let Some(existing) = self.local.get_invoice(order.id).await.map_err(store_err)? {
            return Ok(existing);
        }
        let subtotal = order
            .final_amount_cents
            .or(order.quote_amount_cents)
            .ok_or(GatewayError::Transition(TransitionError::QuoteRequired))?;
        let invoice = self
            .local
            .create_invoice(order.id, subtotal, 0, 0, order.items_json.clone())
            .await
            .map_err(store_err)?;
        tracing::info!(order_id = order.id, invoice_id = invoice.id,
            total_cents = invoice.total_cents, "invoice generated");
        Ok(invoice)
    }

    pub async fn get_invoice(
        &self,
        id: i64,
    ) -> Result<GatewayResponse<Option<Invoice>>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.get_invoice(id).await {
                Ok(invoice) => return Ok(GatewayResponse::remote(invoice)),
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(order_id = id, error = %msg,
                        "remote invoice read failed; serving from local store");
                }
            }
        }
        let invoice = self.local.get_invoice(id).await.map_err(store_err)?;
        Ok(GatewayResponse {
            value: invoice,
            degraded: self.local_degraded(),
        })
    }

    pub async fn attempt_payment(
        &self,
        id: i64,
        actor: &str,
    ) -> Result<GatewayResponse<ChargeSummary>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.attempt_payment(id).await {
                Ok(summary) => {
                    self.mirror_local(&summary.order).await;
                    return Ok(GatewayResponse::remote(summary));
                }
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(order_id = id, error = %msg,
                        "remote charge failed to start; charging locally");
                }
            }
        }
        self.local_charge(id, actor).await
    }

    pub async fn retry_payment(
        &self,
        id: i64,
        actor: &str,
    ) -> Result<GatewayResponse<ChargeSummary>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.retry_payment(id).await {
                Ok(summary) => {
                    self.mirror_local(&summary.order).await;
                    return Ok(GatewayResponse::remote(summary));
                }
                Err(e) => {
                    let msg = self.fallback_allowed(e)?;
                    tracing::warn!(order_id = id, error = %msg,
                        "remote retry failed to start; retrying locally");
                }
            }
        }
        self.local_charge(id, actor).await
    }

    async fn local_charge(
        &self,
        id: i64,
        actor: &str,
    ) -> Result<GatewayResponse<ChargeSummary>, GatewayError> {
        let outcome = self.orchestrator.retry_payment(id, actor).await?;
        audit::record_all(&outcome.events);
        let summary = ChargeSummary {
            amount_cents: outcome.attempt.amount_cents,
            transaction_id: outcome.attempt.transaction_id.clone(),
            succeeded: outcome.succeeded(),
            failure_reason: outcome.attempt.failure_reason.clone(),
            next_retry_at: outcome.attempt.next_retry_at,
            order: outcome.order,
        };
        Ok(GatewayResponse {
            value: summary,
            degraded: self.local_degraded(),
        })
    }

    async fn require_local(&self, id: i64) -> Result<Order, GatewayError> {
        self.local
            .get_order(id)
            .await
            .map_err(store_err)?
            .ok_or(GatewayError::NotFound(id))
    }

    /// Local lookup with a remote fetch-and-mirror for orders created
    /// while this instance was degraded.
    async fn require_order_anywhere(&self, id: i64) -> Result<Order, GatewayError> {
        if let Some(order) = self.local.get_order(id).await.map_err(store_err)? {
            return Ok(order);
        }
        if let Some(remote) = &self.remote {
            if let Ok(Some(order)) = remote.get_order(id).await {
                self.local.save_order(&order).await.map_err(store_err)?;
                return Ok(order);
            }
        }
        Err(GatewayError::NotFound(id))
    }
}
