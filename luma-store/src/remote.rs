use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use luma_order::models::{Invoice, NewOrder, Order, OrderStatus, PaymentStatus};
use luma_order::repository::NewPaymentMethod;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Errors from the remote order service, split so callers can tell a
/// degraded remote apart from a definitive rejection. Fallback applies
/// only to `Unavailable`.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote order service unavailable: {0}")]
    Unavailable(String),

    #[error("remote order service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Result of a charge attempt as reported by whichever side ran it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeSummary {
    pub order: Order,
    pub amount_cents: i64,
    pub transaction_id: String,
    pub succeeded: bool,
    pub failure_reason: String,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// The remote order service's API, mirroring the local surface. The
/// gateway tries these first and falls back per policy.
#[async_trait]
pub trait RemoteOrders: Send + Sync {
    async fn create_order(&self, draft: &NewOrder) -> Result<Order, RemoteError>;
    async fn get_order(&self, id: i64) -> Result<Option<Order>, RemoteError>;
    async fn update_status(
        &self,
        id: i64,
        status: OrderStatus,
        actor: &str,
    ) -> Result<Order, RemoteError>;
    async fn update_payment_status(
        &self,
        id: i64,
        payment_status: PaymentStatus,
    ) -> Result<Order, RemoteError>;
    async fn update_admin_notes(&self, id: i64, notes: &str) -> Result<Order, RemoteError>;
    async fn delete_order(&self, id: i64) -> Result<bool, RemoteError>;
    async fn list_by_user(&self, user_email: &str) -> Result<Vec<Order>, RemoteError>;
    async fn list_admin(
        &self,
        status: Option<OrderStatus>,
        search: Option<&str>,
    ) -> Result<Vec<Order>, RemoteError>;
    async fn save_payment_method(
        &self,
        id: i64,
        method: &NewPaymentMethod,
    ) -> Result<Order, RemoteError>;
    async fn generate_invoice(&self, id: i64) -> Result<Invoice, RemoteError>;
    async fn get_invoice(&self, id: i64) -> Result<Option<Invoice>, RemoteError>;
    async fn attempt_payment(&self, id: i64) -> Result<ChargeSummary, RemoteError>;
    async fn retry_payment(&self, id: i64) -> Result<ChargeSummary, RemoteError>;
}

#[derive(Serialize)]
struct StatusBody<'a> {
    status: OrderStatus,
    actor: &'a str,
}

#[derive(Serialize)]
struct PaymentStatusBody {
    payment_status: PaymentStatus,
}

#[derive(Serialize)]
struct NotesBody<'a> {
    notes: &'a str,
}

/// reqwest-backed client with a bounded per-request timeout. Transport
/// failures, timeouts and 5xx responses all read as `Unavailable`.
pub struct HttpRemoteOrders {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRemoteOrders {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn handle<T: DeserializeOwned>(
        resp: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, RemoteError> {
        let resp = resp.map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if status.is_server_error() {
            return Err(RemoteError::Unavailable(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("bad response body: {e}")))
    }

    /// Like `handle` but folds a 404 into `None`.
    async fn handle_optional<T: DeserializeOwned>(
        resp: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<Option<T>, RemoteError> {
        match Self::handle(resp).await {
            Ok(v) => Ok(Some(v)),
            Err(RemoteError::Rejected { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RemoteOrders for HttpRemoteOrders {
    async fn create_order(&self, draft: &NewOrder) -> Result<Order, RemoteError> {
        let resp = self.http.post(self.url("/api/orders")).json(draft).send().await;
        Self::handle(resp).await
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, RemoteError> {
        let resp = self.http.get(self.url(&format!("/api/orders/{id}"))).send().await;
        Self::handle_optional(resp).await
    }

    async fn update_status(
        &self,
        id: i64,
        status: OrderStatus,
        actor: &str,
    ) -> Result<Order, RemoteError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/admin/orders/{id}/status")))
            .json(&StatusBody { status, actor })
            .send()
            .await;
        Self::handle(resp).await
    }

    async fn update_payment_status(
        &self,
        id: i64,
        payment_status: PaymentStatus,
    ) -> Result<Order, RemoteError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/admin/orders/{id}/payment-status")))
            .json(&PaymentStatusBody { payment_status })
            .send()
            .await;
        Self::handle(resp).await
    }

    async fn update_admin_notes(&self, id: i64, notes: &str) -> Result<Order, RemoteError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/admin/orders/{id}/admin-notes")))
            .json(&NotesBody { notes })
            .send()
            .await;
        Self::handle(resp).await
    }

    async fn delete_order(&self, id: i64) -> Result<bool, RemoteError> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/admin/orders/{id}")))
            .send()
            .await;
        let resp = resp.map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if status.is_server_error() {
            return Err(RemoteError::Unavailable(format!("HTTP {}", status.as_u16())));
        }
        if status.is_success() {
            return Ok(true);
        }
        if status.as_u16() == 404 {
            return Ok(false);
        }
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: resp.text().await.unwrap_or_default(),
        })
    }

    async fn list_by_user(&self, user_email: &str) -> Result<Vec<Order>, RemoteError> {
        let resp = self
            .http
            .get(self.url("/api/orders"))
            .query(&[("userEmail", user_email)])
            .send()
            .await;
        Self::handle(resp).await
    }

    async fn list_admin(
        &self,
        status: Option<OrderStatus>,
        search: Option<&str>,
    ) -> Result<Vec<Order>, RemoteError> {
        let mut req = self.http.get(self.url("/api/admin/orders"));
        if let Some(status) = status {
            // Query value matches the wire form of the enum.
            let value = serde_json::to_value(status)
                .ok()
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_default();
            req = req.query(&[("status", value)]);
        }
        if let Some(search) = search {
            req = req.query(&[("search", search)]);
        }
        Self::handle(req.send().await).await
    }

    async fn save_payment_method(
        &self,
        id: i64,
        method: &NewPaymentMethod,
    ) -> Result<Order, RemoteError> {
        #[derive(Serialize)]
        struct Body<'a> {
            user_email: &'a str,
            card_token: &'a str,
            card_last4: &'a str,
            card_brand: &'a str,
            expiry_month: &'a str,
            expiry_year: &'a str,
        }
        let resp = self
            .http
            .post(self.url(&format!("/api/orders/{id}/payment-method")))
            .json(&Body {
                user_email: &method.user_email,
                card_token: &method.card_token,
                card_last4: &method.card_last4,
                card_brand: &method.card_brand,
                expiry_month: &method.expiry_month,
                expiry_year: &method.expiry_year,
            })
            .send()
            .await;
        Self::handle(resp).await
    }

    async fn generate_invoice(&self, id: i64) -> Result<Invoice, RemoteError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/orders/{id}/invoice/generate")))
            .send()
            .await;
        Self::handle(resp).await
    }

    async fn get_invoice(&self, id: i64) -> Result<Option<Invoice>, RemoteError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/orders/{id}/invoice")))
            .send()
            .await;
        Self::handle_optional(resp).await
    }

    async fn attempt_payment(&self, id: i64) -> Result<ChargeSummary, RemoteError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/orders/{id}/payment/attempt")))
            .send()
            .await;
        Self::handle(resp).await
    }

    async fn retry_payment(&self, id: i64) -> Result<ChargeSummary, RemoteError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/orders/{id}/payment/retry")))
            .send()
            .await;
        Self::handle(resp).await
    }
}
