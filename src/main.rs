use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

use luxia_studio::{
    capability::CapabilityRegistry,
    catalog::ServiceCatalog,
    config::AppConfig,
    gemini::GeminiClient,
    routes::{router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env();
    if config.gemini.is_demo() {
        tracing::warn!("No GEMINI_API_KEY set, running in demo mode");
    } else {
        let key = &config.gemini.api_key;
        tracing::info!("Using API key: {}...", &key[..key.char_indices().nth(6).map_or(key.len(), |(i, _)| i)]);
    }

    let catalog = match &config.catalog_path {
        Some(path) => ServiceCatalog::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ServiceCatalog::builtin().context("built-in catalog")?,
    };
    let capabilities = CapabilityRegistry::uniform(Arc::new(GeminiClient::new(config.gemini.clone())));

    let app = router(AppState::new(catalog, capabilities)).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.context("binding listener")?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
