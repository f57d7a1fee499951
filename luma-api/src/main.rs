use std::net::SocketAddr;
use std::sync::Arc;

use luma_api::{app, AppState};
use luma_order::orchestrator::MockCardGateway;
use luma_store::{HttpRemoteOrders, JobQueue, MemoryOrderStore, ResilientOrderGateway};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "luma_api=debug,luma_store=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = luma_store::Config::load().expect("Failed to load config");
    tracing::info!("Starting LUMA API on port {}", config.server.port);

    let remote: Option<Arc<dyn luma_store::RemoteOrders>> = match &config.remote.base_url {
        Some(base_url) if !base_url.trim().is_empty() => {
            let client = HttpRemoteOrders::new(base_url, config.remote.timeout_seconds)
                .expect("Failed to build remote order client");
            tracing::info!(%base_url, remote_only = config.remote.remote_only, "remote order service configured");
            Some(Arc::new(client))
        }
        _ => {
            tracing::info!("no remote order service configured; local store is authoritative");
            None
        }
    };

    if config.billing.gateway_configured() {
        tracing::warn!("billing.secret_key is set but only the mock card gateway is wired in");
    }
    let card_gateway = Arc::new(MockCardGateway::default());

    let store = Arc::new(MemoryOrderStore::new());
    let queue = Arc::new(JobQueue::new());
    let gateway = Arc::new(ResilientOrderGateway::new(
        remote,
        store,
        card_gateway,
        queue.clone(),
        config.remote.remote_only,
    ));

    let app_state = AppState {
        gateway,
        queue,
        webhook_secret: config.billing.webhook_secret.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server port");
    axum::serve(listener, app).await.expect("Server error");
}
