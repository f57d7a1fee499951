pub mod audit;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod repository;

pub use lifecycle::{AuditEvent, TransitionError};
pub use models::{
    Address, AttemptStatus, Invoice, InvoiceStatus, NewOrder, Order, OrderStatus, PaymentAttempt,
    PaymentMethod, PaymentStatus,
};
pub use orchestrator::{
    MockCardGateway, MockMode, PaymentError, PaymentOrchestrator, PaymentOutcome,
};
pub use repository::{NewAttempt, NewPaymentMethod, NotificationSink, OrderRepository};
