use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use noiiolelo_search::{config, ProviderManager};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "noiiolelo_search=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration / 加载配置
    config::init_config().map_err(anyhow::Error::msg)?;
    let app_config = config::config();
    tracing::info!("Server will listen on {}:{}", app_config.server.host, app_config.server.port);

    let providers = ProviderManager::from_config(&app_config).await?;
    for status in providers.list().await {
        match &status.error {
            Some(e) => tracing::warn!("Provider {} unavailable: {}", status.name, e),
            None if status.enabled => tracing::info!("Provider {} ready (default: {})", status.name, status.default),
            None => tracing::debug!("Provider {} disabled", status.name),
        }
    }

    let state = Arc::new(AppState { providers });
    let app = api::router(state);

    let bind_addr = app_config.get_bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
