use anyhow::Result;
use bookrank::config::{
    IngestConfig, ProviderConfig, RankConfig, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_CONTENT_BASE_URL,
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_METADATA_BASE_URL,
};
use bookrank::provider::GutenbergClient;
use bookrank::store::IndexStore;
use clap::Parser;
use server::{build_app, AppState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Base URL of the metadata provider
    #[arg(long, default_value = DEFAULT_METADATA_BASE_URL)]
    metadata_url: String,
    /// Base URL of the plain-text provider
    #[arg(long, default_value = DEFAULT_CONTENT_BASE_URL)]
    content_url: String,
    /// Upstream request timeout
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    timeout_secs: u64,
    /// Concurrent fetches for admin-triggered ingestion
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let timeout = Duration::from_secs(args.timeout_secs);
    let store = IndexStore::open(&args.index)?;
    let client = GutenbergClient::new(&ProviderConfig {
        metadata_base_url: args.metadata_url,
        content_base_url: args.content_url,
        timeout,
        ..ProviderConfig::default()
    })?;
    let ingest = IngestConfig { concurrency: args.concurrency, batch_size: args.batch_size, fetch_timeout: timeout };
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let app = build_app(AppState::new(store.clone(), client, RankConfig::default(), ingest, admin_token));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, index = %args.index, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    store.close()?;
    Ok(())
}
