/// API сервер для кредитного ML конвейера

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use credit_ml::{api, CreditPipeline, PipelineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("invalid configuration")?;

    // Инициализация логирования; RUST_LOG важнее APP_LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = config.server.socket_addr().context("invalid server address")?;

    // Загрузка или первичное обучение выполняются до старта сервера
    let pipeline = tokio::task::spawn_blocking(move || {
        let pipeline = CreditPipeline::open(config);
        if let Some(result) = pipeline.ensure_models() {
            if result.success {
                tracing::info!("Bootstrap training: {}", result.message);
            } else {
                tracing::warn!("Bootstrap training failed: {}", result.message);
            }
        }
        pipeline
    })
    .await
    .context("model initialisation panicked")?;

    let app = api::router(Arc::new(pipeline));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
