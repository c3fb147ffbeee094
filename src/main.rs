use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use scene_image_service::{
    cache::{FileGenerationStore, LocalFileStorage},
    catalog::InMemoryCatalog,
    config::Config,
    openai::OpenAiClient,
    rate_limit::RateLimiter,
    routes::{self, AppState},
    scene::{PromptCrafter, SceneImageOrchestrator},
};

const DEFAULT_CATALOG_PATH: &str = "catalog.json";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let bind_address = config.bind_address();

    let cache_dir = config.resolve_cache_dir();
    tokio::fs::create_dir_all(&cache_dir)
        .await
        .with_context(|| format!("failed to create cache dir {}", cache_dir.display()))?;
    let store = Arc::new(FileGenerationStore::new(LocalFileStorage::new(cache_dir.clone())));

    let catalog_path = config
        .catalog_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH));
    let catalog = Arc::new(InMemoryCatalog::load(&catalog_path)?);

    let openai = Arc::new(OpenAiClient::new(config.openai.clone())?);
    let prompt_builder = Arc::new(PromptCrafter::new(openai.clone()));
    let orchestrator = Arc::new(SceneImageOrchestrator::new(
        catalog,
        prompt_builder,
        openai,
        store,
        config.scene_image.clone(),
    ));
    let rate_limiter = Arc::new(RateLimiter::per_minute(
        config.scene_image.rate_limit.requests_per_minute,
    ));

    let router = routes::router(AppState::new(orchestrator, rate_limiter));
    let tcp_listener = tokio::net::TcpListener::bind(&bind_address).await?;

    tracing::info!(
        address = %bind_address,
        cache_dir = %cache_dir.display(),
        chat_model = %config.openai.chat_model,
        image_model = %config.openai.image_model,
        "scene image service started"
    );

    axum::serve(
        tcp_listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;
    Ok(())
}
