use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use luma_core::BoxError;
use luma_order::models::{
    normalize_email, Invoice, NewOrder, Order, PaymentAttempt, PaymentMethod, PaymentStatus,
};
use luma_order::repository::{NewAttempt, NewPaymentMethod, OrderRepository};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    orders: HashMap<i64, Order>,
    /// Keyed by order id; at most one invoice per order.
    invoices: HashMap<i64, Invoice>,
    attempts: HashMap<i64, Vec<PaymentAttempt>>,
    methods: HashMap<i64, PaymentMethod>,
    next_order_id: i64,
    next_invoice_id: i64,
    next_attempt_id: i64,
    next_method_id: i64,
}

/// In-process order store. All id and attempt-number allocation happens
/// under the write lock, so concurrent callers never collide.
#[derive(Default)]
pub struct MemoryOrderStore {
    inner: RwLock<Tables>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_created_desc(orders: &mut Vec<Order>) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl OrderRepository for MemoryOrderStore {
    async fn create_order(&self, draft: NewOrder) -> Result<Order, BoxError> {
        let mut tables = self.inner.write().await;
        tables.next_order_id += 1;
        let order = Order::new(tables.next_order_id, draft);
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, BoxError> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn save_order(&self, order: &Order) -> Result<(), BoxError> {
        let mut tables = self.inner.write().await;
        tables.orders.insert(order.id, order.clone());
        // Mirrored writes can carry ids allocated elsewhere.
        if order.id > tables.next_order_id {
            tables.next_order_id = order.id;
        }
        Ok(())
    }

    async fn delete_order(&self, id: i64) -> Result<bool, BoxError> {
        let mut tables = self.inner.write().await;
        let existed = tables.orders.remove(&id).is_some();
        tables.invoices.remove(&id);
        tables.attempts.remove(&id);
        Ok(existed)
    }

    async fn list_by_user(&self, user_email: &str) -> Result<Vec<Order>, BoxError> {
        let wanted = normalize_email(user_email);
        let tables = self.inner.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.user_email == wanted)
            .cloned()
            .collect();
        by_created_desc(&mut orders);
        Ok(orders)
    }

    async fn list_all(&self) -> Result<Vec<Order>, BoxError> {
        let tables = self.inner.read().await;
        let mut orders: Vec<Order> = tables.orders.values().cloned().collect();
        by_created_desc(&mut orders);
        Ok(orders)
    }

    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Order>, BoxError> {
        let tables = self.inner.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.payment_intent_id.as_deref() == Some(intent_id))
            .cloned())
    }

    async fn create_invoice(
        &self,
        order_id: i64,
        subtotal_cents: i64,
        tax_cents: i64,
        delivery_fee_cents: i64,
        line_items: String,
    ) -> Result<Invoice, BoxError> {
        let mut tables = self.inner.write().await;
        if let Some(existing) = tables.invoices.get(&order_id) {
            return Ok(existing.clone());
        }
        if !tables.orders.contains_key(&order_id) {
            return Err(format!("order {order_id} not found").into());
        }
        tables.next_invoice_id += 1;
        let invoice = Invoice::new(
            tables.next_invoice_id,
            order_id,
            subtotal_cents,
            tax_cents,
            delivery_fee_cents,
            line_items,
        );
        tables.invoices.insert(order_id, invoice.clone());
        if let Some(order) = tables.orders.get_mut(&order_id) {
            order.invoice_id = Some(invoice.id);
            order.touch();
        }
        Ok(invoice)
    }

    async fn get_invoice(&self, order_id: i64) -> Result<Option<Invoice>, BoxError> {
        Ok(self.inner.read().await.invoices.get(&order_id).cloned())
    }

    async fn save_invoice(&self, invoice: &Invoice) -> Result<(), BoxError> {
        let mut tables = self.inner.write().await;
        tables.invoices.insert(invoice.order_id, invoice.clone());
        Ok(())
    }

    async fn append_attempt(&self, attempt: NewAttempt) -> Result<PaymentAttempt, BoxError> {
        let mut tables = self.inner.write().await;
        tables.next_attempt_id += 1;
        let id = tables.next_attempt_id;
        let history = tables.attempts.entry(attempt.order_id).or_default();
        let number = history
            .iter()
            .map(|a| a.attempt_number)
            .max()
            .unwrap_or(0)
            + 1;
        let recorded = PaymentAttempt {
            id,
            order_id: attempt.order_id,
            invoice_id: attempt.invoice_id,
            status: attempt.status,
            amount_cents: attempt.amount_cents,
            failure_reason: attempt.failure_reason,
            transaction_id: attempt.transaction_id,
            attempt_number: number,
            created_at: Utc::now(),
            next_retry_at: attempt.next_retry_at,
        };
        history.push(recorded.clone());
        Ok(recorded)
    }

    async fn last_attempt(&self, order_id: i64) -> Result<Option<PaymentAttempt>, BoxError> {
        let tables = self.inner.read().await;
        Ok(tables
            .attempts
            .get(&order_id)
            .and_then(|h| h.iter().max_by_key(|a| a.attempt_number))
            .cloned())
    }

    async fn list_attempts(&self, order_id: i64) -> Result<Vec<PaymentAttempt>, BoxError> {
        let tables = self.inner.read().await;
        let mut attempts = tables.attempts.get(&order_id).cloned().unwrap_or_default();
        attempts.sort_by_key(|a| a.attempt_number);
        Ok(attempts)
    }

    async fn save_payment_method(
        &self,
        method: NewPaymentMethod,
    ) -> Result<PaymentMethod, BoxError> {
        let mut tables = self.inner.write().await;
        tables.next_method_id += 1;
        let stored = PaymentMethod {
            id: tables.next_method_id,
            user_email: normalize_email(&method.user_email),
            card_token: method.card_token,
            card_last4: method.card_last4,
            card_brand: method.card_brand,
            expiry_month: method.expiry_month,
            expiry_year: method.expiry_year,
            is_default: true,
            is_verified: true,
            created_at: Utc::now(),
            last_used_at: None,
        };
        tables.methods.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_payment_method(&self, id: i64) -> Result<Option<PaymentMethod>, BoxError> {
        Ok(self.inner.read().await.methods.get(&id).cloned())
    }
}

/// Attach helpers used by the gateway's local write path.
impl MemoryOrderStore {
    /// Stores the card and points the order at it, moving payment status
    /// to `PaymentMethodOnFile` unless billing has already progressed.
    pub async fn attach_payment_method(
        &self,
        order_id: i64,
        method: NewPaymentMethod,
    ) -> Result<Option<Order>, BoxError> {
        let stored = self.save_payment_method(method).await?;
        let mut tables = self.inner.write().await;
        let Some(order) = tables.orders.get_mut(&order_id) else {
            return Ok(None);
        };
        order.payment_method_id = Some(stored.id);
        if matches!(
            order.payment_status,
            PaymentStatus::NoPaymentMethod | PaymentStatus::PaymentFailed
        ) {
            order.payment_status = PaymentStatus::PaymentMethodOnFile;
        }
        order.touch();
        Ok(Some(order.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use luma_order::models::{Address, AttemptStatus};

    fn draft(email: &str) -> NewOrder {
        NewOrder {
            user_email: email.to_string(),
            service_type: "Pickup".to_string(),
            scheduled_at: Utc::now() + Duration::days(1),
            address: Address::default(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn orders_get_sequential_ids() {
        let store = MemoryOrderStore::new();
        let a = store.create_order(draft("a@x.com")).await.unwrap();
        let b = store.create_order(draft("b@x.com")).await.unwrap();
        assert_eq!(b.id, a.id + 1);
        assert!(store.get_order(a.id).await.unwrap().is_some());
        assert!(store.get_order(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_listing_is_normalized_and_newest_first() {
        let store = MemoryOrderStore::new();
        let first = store.create_order(draft("Jane@Example.com")).await.unwrap();
        let second = store.create_order(draft("jane@example.com ")).await.unwrap();
        store.create_order(draft("other@example.com")).await.unwrap();

        let listed = store.list_by_user("  JANE@example.COM").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn invoice_creation_is_idempotent_per_order() {
        let store = MemoryOrderStore::new();
        let order = store.create_order(draft("a@x.com")).await.unwrap();

        let inv1 = store
            .create_invoice(order.id, 4000, 0, 0, "[]".to_string())
            .await
            .unwrap();
        let inv2 = store
            .create_invoice(order.id, 9999, 100, 100, "[]".to_string())
            .await
            .unwrap();
        assert_eq!(inv1.id, inv2.id);
        assert_eq!(inv2.total_cents, 4000);

        let reloaded = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.invoice_id, Some(inv1.id));
    }

    #[tokio::test]
    async fn attempt_numbers_are_allocated_in_order() {
        let store = MemoryOrderStore::new();
        let order = store.create_order(draft("a@x.com")).await.unwrap();

        for _ in 0..3 {
            store
                .append_attempt(NewAttempt {
                    order_id: order.id,
                    invoice_id: None,
                    status: AttemptStatus::Failed,
                    amount_cents: 4000,
                    failure_reason: "Card declined".to_string(),
                    transaction_id: String::new(),
                    next_retry_at: None,
                })
                .await
                .unwrap();
        }

        let attempts = store.list_attempts(order.id).await.unwrap();
        let numbers: Vec<i32> = attempts.iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(
            store.last_attempt(order.id).await.unwrap().unwrap().attempt_number,
            3
        );
    }

    #[tokio::test]
    async fn delete_removes_billing_records_too() {
        let store = MemoryOrderStore::new();
        let order = store.create_order(draft("a@x.com")).await.unwrap();
        store
            .create_invoice(order.id, 4000, 0, 0, String::new())
            .await
            .unwrap();

        assert!(store.delete_order(order.id).await.unwrap());
        assert!(!store.delete_order(order.id).await.unwrap());
        assert!(store.get_invoice(order.id).await.unwrap().is_none());
    }
}
