use anyhow::Result;
use axum::Router;
use clap::Parser;
use esa_core::ModelConfig;
use esa_server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Model directory path
    #[arg(long, default_value = "./model")]
    model: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// JSON file with model settings; only the query-time ones are used
    #[arg(long)]
    config: Option<PathBuf>,
    /// Chunks kept in memory
    #[arg(long)]
    cache_chunks: Option<usize>,
    /// Concepts returned when a request has no `k`
    #[arg(long)]
    top_concepts: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ModelConfig::from_json_file(path)?,
        None => ModelConfig::default(),
    };
    if let Some(v) = args.cache_chunks { config.cache_chunks = v; }
    if let Some(v) = args.top_concepts { config.top_concepts = v; }
    config.validate()?;

    let app: Router = build_app(&args.model, config.cache_chunks, config.top_concepts)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, model = %args.model.display(), "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
