use mp3_relay::{ApiError, AppState, RelayConfig, build_router};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "mp3_relay=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = RelayConfig::from_env();

    info!(
        "Relaying to {} in {} mode (queued retries: {}, deadline: {:?})",
        config.upstream.url, config.response_mode, config.queue_retry.limit, config.deadline
    );
    if config.unbounded_queue_polling() {
        warn!(
            "QUEUE_MAX_RETRIES=unbounded: queued conversions are polled until the {:?} deadline",
            config.deadline
        );
    }

    let state = AppState::new(&config)?;
    let app = build_router(&config, state)?;

    let listener = TcpListener::bind(&config.bind_addr).await.map_err(|error| {
        ApiError::internal(format!("Could not bind {}: {error}", config.bind_addr))
    })?;

    info!("API server running on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}
