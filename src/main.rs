use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streaming_chat_service::{AppConfig, ConversationStore, ModelHandle, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?);
    let store = Arc::new(ConversationStore::open(&config.db_path)?);

    let removed = store.cleanup_older_than(config.cleanup_days)?;
    if removed > 0 {
        tracing::info!(removed, "cleaned up stale conversations");
    }

    let model = load_model(&config)?;
    if model.is_none() {
        tracing::warn!("no model backend compiled in; chat requests will return 503");
    }

    let router = build_router(config.clone(), store, model);

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "chat server ready");

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(feature = "tch-backend")]
fn load_model(config: &AppConfig) -> anyhow::Result<Option<ModelHandle>> {
    tracing::info!(
        module = %config.model_module_path.display(),
        tokenizer = %config.tokenizer_path.display(),
        "loading model artifacts"
    );
    Ok(Some(ModelHandle::load(config)?))
}

#[cfg(not(feature = "tch-backend"))]
fn load_model(_config: &AppConfig) -> anyhow::Result<Option<ModelHandle>> {
    Ok(None)
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,axum::rejection=trace".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
