use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use megamarket::{build_app, CatalogConfig};
use tower_http::trace::TraceLayer;

/// CLI arguments for the catalog server
#[derive(Parser, Debug)]
#[command(name = "megamarket")]
#[command(about = "Product catalog with hierarchical price aggregation")]
struct Args {
    /// Address to bind
    #[arg(long, env = "MEGAMARKET_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port for the HTTP server
    #[arg(short, long, env = "MEGAMARKET_PORT", default_value = "80")]
    port: u16,

    /// Path to the SQLite database
    #[arg(long, env = "MEGAMARKET_DB", default_value = "megamarket.db")]
    db: PathBuf,

    /// Maximum pooled database connections
    #[arg(long, env = "MEGAMARKET_DB_CONNECTIONS", default_value = "8")]
    db_connections: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (silently ignore if not found)
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("megamarket=info,tower_http=info,sqlx=warn")
        });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let args = Args::parse();

    let config = CatalogConfig {
        db_path: args.db.clone(),
        max_connections: args.db_connections,
        ..CatalogConfig::default()
    };
    let (router, _service) = build_app(config).await?;
    let app = router.layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Catalog listening on http://{}", addr);
    tracing::info!("Database: {}", args.db.display());

    axum::serve(listener, app).await?;

    Ok(())
}
