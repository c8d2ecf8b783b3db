use std::sync::Arc;

use caption_relay::caption::CaptionService;
use caption_relay::config::Config;
use caption_relay::upstream::DashScopeClient;
use caption_relay::{build_router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    tracing::debug!(?config, "configuration loaded");

    let upstream = DashScopeClient::new(config.upstream.clone())?;
    let service = CaptionService::new(Arc::new(upstream), config.normalize, config.cleanup);
    let app = build_router(AppState {
        service: Arc::new(service),
        max_upload_bytes: config.max_upload_bytes,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
