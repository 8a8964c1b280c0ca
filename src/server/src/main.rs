//! A3S Enrich - webhook server binary.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use a3s_enrich_runtime::{OciRegistry, OpenAiDescriber, Pipeline, Registry};
use a3s_enrich_server::{create_app, AppState, Args, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.into_config();
    config.validate()?;

    tracing::info!(
        version = a3s_enrich_core::VERSION,
        listen = %config.listen_address,
        registry = %config.registry.address,
        plain_http = config.registry.plain_http,
        endpoint = %config.describer.endpoint,
        tag = %config.tag,
        "Starting A3S Enrich"
    );

    let registry = OciRegistry::new(&config.registry);
    if let Err(e) = registry.ping().await {
        // Keep serving; the registry may come up after us.
        tracing::error!(error = %e, "Failed to ping registry");
    }

    let describer = OpenAiDescriber::new(config.describer.clone())?;
    let pipeline =
        Pipeline::new(Arc::new(registry), Arc::new(describer)).with_tag(config.tag.clone());
    let app = create_app(AppState::new(pipeline));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!(address = %address, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
