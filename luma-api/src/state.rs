use std::sync::Arc;

use luma_store::{JobQueue, ResilientOrderGateway};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ResilientOrderGateway>,
    pub queue: Arc<JobQueue>,
    /// Shared secret for webhook signature checks. Unset means signatures
    /// are not enforced (mock gateway mode).
    pub webhook_secret: Option<String>,
}
