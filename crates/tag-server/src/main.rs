use anyhow::Result;
use application::TagRegistry;
use clap::Parser;
use infrastructure::{TagFieldConfig, install_schema};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tag_server::api;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config directory
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tag_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Tag server starting");

    let mut config = TagFieldConfig::load(&args.config_dir)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let registry = TagRegistry::from_config(&config.models)?;
    info!(
        models = registry.models().len(),
        tables = registry.tables().count(),
        "Loaded tag fields"
    );

    info!("Connecting to database...");
    let db = sea_orm::Database::connect(&config.database_url).await?;
    install_schema(&db, &registry.schema()).await?;

    let state = tag_server::setup_app_state(Arc::new(registry), db);
    let app = api::create_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Autocomplete listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
