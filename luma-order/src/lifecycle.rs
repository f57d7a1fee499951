use chrono::{DateTime, Utc};
use luma_pricing::Quote;
use serde::Serialize;

use crate::models::{Order, OrderStatus, PaymentStatus};

/// Emitted for every transition; consumed by the audit sink rather than
/// written from inside business logic.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub order_id: i64,
    pub action: String,
    pub actor: String,
    pub old_status: Option<OrderStatus>,
    pub new_status: Option<OrderStatus>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn transition(
        order_id: i64,
        action: &str,
        actor: &str,
        old: OrderStatus,
        new: OrderStatus,
    ) -> Self {
        Self {
            order_id,
            action: action.to_string(),
            actor: actor.to_string(),
            old_status: Some(old),
            new_status: Some(new),
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn note(order_id: i64, action: &str, actor: &str, detail: String) -> Self {
        Self {
            order_id,
            action: action.to_string(),
            actor: actor.to_string(),
            old_status: None,
            new_status: None,
            detail: Some(detail),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Orders can only be cancelled while pending pickup (current status {0:?})")]
    CancelNotAllowed(OrderStatus),

    #[error("A computed quote is required before the order can be quoted")]
    QuoteRequired,
}

/// Legal next statuses for each state. The storage layer does not enforce
/// this table; the orchestration layer must route every combined write
/// through it.
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        PendingPickup => &[PickedUp, Cancelled],
        PickedUp => &[WeighedOrCounted],
        WeighedOrCounted => &[Quoted, Approved],
        Quoted => &[Approved],
        Approved => &[InProgress],
        InProgress => &[Ready],
        Ready => &[ChargeAttempted, Paid, Delivered, PaymentFailed],
        ChargeAttempted => &[Paid, PaymentFailed, PaymentActionRequired],
        Paid => &[Delivered, Completed],
        Delivered => &[Paid, Completed],
        PaymentFailed => &[ChargeAttempted, Paid, PaymentActionRequired],
        PaymentActionRequired => &[ChargeAttempted, Paid, PaymentFailed],
        Cancelled | Completed => &[],
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Outcome of a staff-driven status update: the audit event plus whether
/// the transition obligates the caller to run the payment workflow.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub event: AuditEvent,
    pub triggers_payment: bool,
}

/// Apply a staff-driven status change. Entering `Ready` with a chargeable
/// payment status triggers invoicing and the payment orchestrator as a
/// side effect of the transition, not as a separate caller step.
pub fn apply_status(
    order: &mut Order,
    to: OrderStatus,
    actor: &str,
) -> Result<TransitionOutcome, TransitionError> {
    let from = order.status;
    if to == OrderStatus::Cancelled {
        return cancel(order, actor).map(|event| TransitionOutcome {
            event,
            triggers_payment: false,
        });
    }
    if !can_transition(from, to) {
        return Err(TransitionError::InvalidTransition { from, to });
    }
    // Quoted and Approved are quote-bearing states; a status push cannot
    // enter them without a computed quote on the order.
    if matches!(to, OrderStatus::Quoted | OrderStatus::Approved)
        && order.quote_amount_cents.is_none()
    {
        return Err(TransitionError::QuoteRequired);
    }
    // Approving a pending quote also moves the billing side, so the Ready
    // transition can trigger the charge later.
    if from == OrderStatus::Quoted && to == OrderStatus::Approved {
        return approve_quote(order, actor).map(|event| TransitionOutcome {
            event,
            triggers_payment: false,
        });
    }

    order.status = to;
    if to == OrderStatus::Completed {
        order.closed_at = Some(Utc::now());
    }
    order.touch();

    let triggers_payment = to == OrderStatus::Ready
        && matches!(
            order.payment_status,
            PaymentStatus::PaymentMethodOnFile | PaymentStatus::Approved
        );

    Ok(TransitionOutcome {
        event: AuditEvent::transition(order.id, "Status Changed", actor, from, to),
        triggers_payment,
    })
}

/// Cancellation is only legal while the order is still pending pickup;
/// later-stage cancels are a business-rule violation, never a silent no-op.
pub fn cancel(order: &mut Order, actor: &str) -> Result<AuditEvent, TransitionError> {
    if order.status != OrderStatus::PendingPickup {
        return Err(TransitionError::CancelNotAllowed(order.status));
    }
    let from = order.status;
    order.status = OrderStatus::Cancelled;
    order.closed_at = Some(Utc::now());
    order.touch();
    Ok(AuditEvent::transition(
        order.id,
        "Order Cancelled",
        actor,
        from,
        OrderStatus::Cancelled,
    ))
}

/// Attach a computed quote. Small orders at or under the applied minimum
/// auto-approve; anything above it (or over the customer's estimate by more
/// than 20%) waits for explicit customer sign-off.
pub fn apply_quote(
    order: &mut Order,
    quote: &Quote,
    actor: &str,
) -> Result<AuditEvent, TransitionError> {
    if quote.line_items.is_empty() && quote.total_cents == 0 {
        return Err(TransitionError::QuoteRequired);
    }

    let from = order.status;
    order.items_json = quote.line_items_json();
    order.quote_amount_cents = Some(quote.total_cents);
    order.final_amount_cents = Some(quote.total_cents);

    let (status, payment_status) = if quote.requires_approval {
        (OrderStatus::Quoted, PaymentStatus::ApprovalRequired)
    } else {
        (OrderStatus::Approved, PaymentStatus::Approved)
    };
    order.status = status;
    order.payment_status = payment_status;
    order.touch();

    Ok(AuditEvent::transition(
        order.id,
        "Quote Attached",
        actor,
        from,
        status,
    ))
}

/// Customer approval of a pending quote.
pub fn approve_quote(order: &mut Order, actor: &str) -> Result<AuditEvent, TransitionError> {
    let from = order.status;
    if from != OrderStatus::Quoted {
        return Err(TransitionError::InvalidTransition {
            from,
            to: OrderStatus::Approved,
        });
    }
    order.status = OrderStatus::Approved;
    order.payment_status = PaymentStatus::Approved;
    order.touch();
    Ok(AuditEvent::transition(
        order.id,
        "Quote Approved",
        actor,
        from,
        OrderStatus::Approved,
    ))
}
