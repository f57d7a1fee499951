use chrono::{DateTime, Utc};
use luma_pricing::PricingType;
use serde::{Deserialize, Serialize};

/// Fulfillment status in the order lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPickup,
    PickedUp,
    WeighedOrCounted,
    Quoted,
    Approved,
    InProgress,
    Ready,
    ChargeAttempted,
    Paid,
    Delivered,
    Completed,
    Cancelled,
    PaymentFailed,
    PaymentActionRequired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Completed)
    }
}

/// Billing status, tracked alongside but distinct from fulfillment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    NoPaymentMethod,
    PaymentMethodOnFile,
    ApprovalRequired,
    Approved,
    ChargeAttempted,
    Paid,
    PaymentFailed,
    PaymentActionRequired,
}

/// Structured pickup/delivery address. The denormalized display string on
/// the order is always derivable from these fields when any are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

impl Address {
    pub fn is_blank(&self) -> bool {
        self.line1.trim().is_empty()
            && self.line2.trim().is_empty()
            && self.city.trim().is_empty()
            && self.state.trim().is_empty()
            && self.zip_code.trim().is_empty()
    }

    pub fn display(&self) -> String {
        let mut street = self.line1.trim().to_string();
        if !self.line2.trim().is_empty() {
            if street.is_empty() {
                street = self.line2.trim().to_string();
            } else {
                street = format!("{}, {}", street, self.line2.trim());
            }
        }

        let mut locality = self.city.trim().to_string();
        if !self.state.trim().is_empty() {
            if locality.is_empty() {
                locality = self.state.trim().to_string();
            } else {
                locality = format!("{}, {}", locality, self.state.trim());
            }
        }
        if !self.zip_code.trim().is_empty() {
            if locality.is_empty() {
                locality = self.zip_code.trim().to_string();
            } else {
                locality = format!("{} {}", locality, self.zip_code.trim());
            }
        }

        match (street.is_empty(), locality.is_empty()) {
            (true, _) => locality,
            (_, true) => street,
            _ => format!("{}, {}", street, locality),
        }
    }
}

/// Fields supplied by the scheduling action; everything else is assigned by
/// the store or filled in by later workflow steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_email: String,
    pub service_type: String,
    pub scheduled_at: DateTime<Utc>,
    pub address: Address,
    pub notes: String,
}

/// The central entity: a scheduled laundry service request and its
/// fulfillment/billing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_email: String,
    pub service_type: String,
    pub pricing_type: PricingType,
    pub scheduled_at: DateTime<Utc>,
    pub address: Address,
    /// Legacy flat address string, kept as the display fallback.
    pub display_address: String,
    pub notes: String,
    pub admin_notes: String,
    pub bag_weight_lbs: Option<f64>,
    /// Serialized priced line items from the most recent quote.
    pub items_json: String,
    pub quote_amount_cents: Option<i64>,
    pub final_amount_cents: Option<i64>,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub payment_method_id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub terms_accepted: bool,
    pub terms_accepted_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(id: i64, draft: NewOrder) -> Self {
        let now = Utc::now();
        let display_address = draft.address.display();
        Self {
            id,
            user_email: normalize_email(&draft.user_email),
            service_type: draft.service_type,
            pricing_type: PricingType::Personal,
            scheduled_at: draft.scheduled_at,
            address: draft.address,
            display_address,
            notes: draft.notes,
            admin_notes: String::new(),
            bag_weight_lbs: None,
            items_json: "[]".to_string(),
            quote_amount_cents: None,
            final_amount_cents: None,
            currency: "usd".to_string(),
            payment_intent_id: None,
            payment_method_id: None,
            invoice_id: None,
            terms_accepted: false,
            terms_accepted_at: None,
            status: OrderStatus::PendingPickup,
            payment_status: PaymentStatus::NoPaymentMethod,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    /// Display string derived from the structured fields, falling back to
    /// the legacy flat string when none are filled in.
    pub fn address_display(&self) -> String {
        if self.address.is_blank() {
            self.display_address.clone()
        } else {
            self.address.display()
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Normalized form used for all user-scoped lookups: trimmed, lowercased,
/// with whitespace/control/format characters dropped.
pub fn normalize_email(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Final,
    /// Substate held only while a charge attempt is in flight.
    Locked,
    Void,
}

/// At most one per order, created by the quoting step. Amounts are
/// immutable once created; only the status moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub order_id: i64,
    pub status: InvoiceStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub delivery_fee_cents: i64,
    pub tip_cents: i64,
    pub total_cents: i64,
    pub line_items: String,
    pub created_at: DateTime<Utc>,
    pub finalized_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn new(
        id: i64,
        order_id: i64,
        subtotal_cents: i64,
        tax_cents: i64,
        delivery_fee_cents: i64,
        line_items: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            order_id,
            status: InvoiceStatus::Draft,
            subtotal_cents,
            tax_cents,
            delivery_fee_cents,
            tip_cents: 0,
            total_cents: subtotal_cents + tax_cents + delivery_fee_cents,
            line_items: if line_items.trim().is_empty() {
                "[]".to_string()
            } else {
                line_items
            },
            created_at: now,
            finalized_at: now,
            locked_at: None,
            voided_at: None,
        }
    }

    pub fn lock(&mut self) {
        self.status = InvoiceStatus::Locked;
        self.locked_at = Some(Utc::now());
    }

    pub fn finalize(&mut self) {
        self.status = InvoiceStatus::Final;
        self.finalized_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    Pending,
    Success,
    Failed,
}

/// One logged try to charge the customer. Append-only; an order's payment
/// truth is the latest attempt plus the order's own status fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: i64,
    pub order_id: i64,
    pub invoice_id: Option<i64>,
    pub status: AttemptStatus,
    pub amount_cents: i64,
    pub failure_reason: String,
    pub transaction_id: String,
    pub attempt_number: i32,
    pub created_at: DateTime<Utc>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Tokenized card on file; full card numbers never enter the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: i64,
    pub user_email: String,
    pub card_token: String,
    pub card_last4: String,
    pub card_brand: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub is_default: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}
