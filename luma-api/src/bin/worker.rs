use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "luma_api=debug,luma_store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = luma_store::Config::load().expect("Failed to load config");
    let mailer = luma_api::mailer::build_mailer(&config.mail);

    luma_api::worker::run(config.worker, mailer).await;
}
