use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BoxError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    Processing,
    Succeeded,
    Failed,
    RequiresAction,
}

/// A charge tracked at the external card network, keyed by the provider's
/// intent id (e.g. pi_123).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub order_id: i64,
    pub amount_cents: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Charge request handed to a card gateway. The idempotency key is stable
/// per order + amount so a retried network call cannot double-charge.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_id: i64,
    pub amount_cents: i64,
    pub currency: String,
    pub card_token: String,
}

impl ChargeRequest {
    pub fn idempotency_key(&self) -> String {
        format!("order-{}-amount-{}", self.order_id, self.amount_cents)
    }
}

#[async_trait]
pub trait CardGateway: Send + Sync {
    /// Create and confirm a charge against the card network.
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentIntent, BoxError>;

    /// Retrieve the current state of an intent.
    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, BoxError>;
}

/// Webhook event vocabulary delivered by the card gateway. These are the
/// authoritative terminal signal when an external gateway is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    Succeeded,
    Failed,
    Processing,
    RequiresAction,
}

impl WebhookEventKind {
    pub fn parse(event_type: &str) -> Option<Self> {
        match event_type {
            "payment_intent.succeeded" => Some(Self::Succeeded),
            "payment_intent.payment_failed" => Some(Self::Failed),
            "payment_intent.processing" => Some(Self::Processing),
            "payment_intent.requires_action" => Some(Self::RequiresAction),
            _ => None,
        }
    }
}
