use parkflow::api::{self, ApiContext};
use parkflow::config;
use parkflow::geocode::HttpGeocoder;
use parkflow::service::LotService;
use parkflow::source::ConfiguredSource;
use parkflow::state::AppState;
use parkflow::weather::HttpWeatherSource;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config::config_path();
    let config = config::load_default()?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = %config_path.display(),
        app = %config.app.name,
        "parkflow starting"
    );

    let state = Arc::new(RwLock::new(AppState::new()));
    let timeout = config.request_timeout();

    let source = ConfiguredSource::from_config(&config)?;
    tracing::info!(
        mode = ?config.source_mode(),
        source = %source.describe(),
        "Lot source configured"
    );

    let weather = match config.weather_url() {
        Some(url) => match HttpWeatherSource::new(url, timeout) {
            Ok(weather) => Some(weather),
            Err(err) => {
                tracing::warn!(error = %err, "Weather source unavailable, congestion uses time only");
                None
            }
        },
        None => None,
    };

    let geocoder = match config.geocode_url() {
        Some(url) => match HttpGeocoder::new(url, timeout) {
            Ok(geocoder) => Some(Arc::new(geocoder)),
            Err(err) => {
                tracing::warn!(error = %err, "Geocoder unavailable, search uses local tables only");
                None
            }
        },
        None => {
            tracing::info!("No geocode endpoint configured");
            None
        }
    };

    let service = LotService::new(
        Arc::clone(&state),
        source,
        weather,
        config.service_settings(),
    );
    let handle = service.start();

    let app = api::router(ApiContext {
        state: Arc::clone(&state),
        refresh: handle.refresh_trigger(),
        geocoder,
        utc_offset: config.utc_offset(),
    });
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    handle.shutdown().await;

    Ok(())
}
