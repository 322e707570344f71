use idempotent_provider::api::{create_router, AppState};
use idempotent_provider::config::Settings;
use idempotent_provider::factory::IdempotencyFactory;
use idempotent_provider::observability::{init_logging, init_metrics, LogConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;

    init_logging(&LogConfig::from(&settings.application));
    info!("Configuration loaded");

    let metrics_handle = init_metrics();

    info!(
        "Building idempotency provider with '{}' storage...",
        settings.idempotency.storage_implementation
    );
    let components = IdempotencyFactory::build(&settings.idempotency).await?;

    let _sweeper = components.sweeper.map(|sweeper| {
        info!("Starting expired entry sweep every {:?}", sweeper.interval());
        sweeper.start()
    });

    let state = AppState::new(components.provider).with_metrics(metrics_handle);
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
