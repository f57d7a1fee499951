use crate::lifecycle::AuditEvent;

/// Audit sink. Transitions emit events; this is the single consumer, so
/// history capture stays out of the state machine itself. Persistence of
/// audit rows is handled outside the core.
pub fn record(event: &AuditEvent) {
    tracing::info!(
        order_id = event.order_id,
        action = %event.action,
        actor = %event.actor,
        old_status = ?event.old_status,
        new_status = ?event.new_status,
        detail = event.detail.as_deref().unwrap_or(""),
        "audit"
    );
}

pub fn record_all(events: &[AuditEvent]) {
    for event in events {
        record(event);
    }
}
