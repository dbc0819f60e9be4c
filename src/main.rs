mod api;
mod config;
mod dispatch;
mod error;
mod metrics;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{DispatchConfig, LogFormat, LoggingConfig},
    dispatch::Dispatcher,
    metrics::MetricsRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = DispatchConfig::from_env().context("failed to build dispatch config")?;
    init_tracing(&cfg.logging);

    tokio::fs::create_dir_all(&cfg.workspace_dir)
        .await
        .with_context(|| format!("failed to create workspace {}", cfg.workspace_dir.display()))?;

    let metrics = Arc::new(MetricsRegistry::new());
    let dispatcher = Arc::new(
        Dispatcher::from_config(&cfg, metrics.clone()).context("failed to build dispatcher")?,
    );

    let app = api::routes(dispatcher, metrics, cfg.max_body_bytes);

    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .context("failed to bind listener")?;

    tracing::info!(
        addr = %cfg.bind_addr,
        workspace = %cfg.workspace_dir.display(),
        python = %cfg.execution.python_bin,
        remote = %cfg.remote.execute_url,
        timeout_ms = cfg.execution.timeout.as_millis() as u64,
        "execution dispatcher listening"
    );

    axum::serve(listener, app)
        .await
        .context("dispatcher server error")?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,reqwest=warn", logging.level))
    });

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
    }
}
