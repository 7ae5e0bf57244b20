use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use google_relay::{api, AppState, Config, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "google_relay=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("google-relay v{}", env!("CARGO_PKG_VERSION"));

    let addr = format!("{}:{}", config.host, config.port);
    let state: SharedState = Arc::new(AppState::from_config(config).await?);

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Backend running on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
