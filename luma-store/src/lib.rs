pub mod app_config;
pub mod gateway;
pub mod jobs;
pub mod memory;
pub mod remote;

pub use app_config::Config;
pub use gateway::{GatewayError, GatewayResponse, ResilientOrderGateway};
pub use jobs::{JobKind, JobQueue, NotificationJob};
pub use memory::MemoryOrderStore;
pub use remote::{ChargeSummary, HttpRemoteOrders, RemoteError, RemoteOrders};
