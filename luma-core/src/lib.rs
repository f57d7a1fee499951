pub mod payment;

/// Boxed error type used across async trait seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
