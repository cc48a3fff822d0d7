// eval-adapter - intercepting adapter proxy for language model evaluation
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use clap::Parser;
use eval_adapter::adapter::{
    build_http_client, build_pipeline, discover, ComponentRegistry, HttpUpstream, ModuleCatalog,
};
use eval_adapter::cli::Args;
use eval_adapter::config::AppConfig;
use eval_adapter::server::create_router;
use eval_adapter::utils::logging;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration, CLI flags win
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting eval-adapter v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Register built-in and discovered components
    let mut registry = ComponentRegistry::with_builtins();
    discover(
        &mut registry,
        &config.adapter.discovery,
        &ModuleCatalog::with_builtins(),
    )?;
    info!(
        "Available interceptors: {}",
        registry.interceptor_names().join(", ")
    );

    // Phase 4: Build the pipeline; an empty one is a configuration error
    let http_client = build_http_client(&config.upstream)?;
    let upstream = Arc::new(HttpUpstream::new(http_client.clone(), &config.upstream.url));
    let pipeline = Arc::new(build_pipeline(
        &config.adapter,
        &registry,
        upstream,
        http_client,
    )?);
    info!("Forwarding to {}", config.upstream.url);

    // Phase 5: Pre-eval hooks and interceptor start-up
    pipeline.start().await?;

    // Phase 6: Serve until signalled
    let app = create_router(Arc::clone(&pipeline), config.server.max_body_bytes);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Phase 7: Flush state and run post-eval hooks
    pipeline.shutdown().await;
    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
