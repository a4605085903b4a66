use std::env;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use orgchart::{audit, db, routes, AppState, Config};

const DEFAULT_CONFIG_PATH: &str = "./etc/orgchart.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "-help" || arg == "--help") {
        println!("Usage: orgchart [OPTIONS]");
        println!("Options:");
        println!("  -config <path>  Path to configuration file (default: {})", DEFAULT_CONFIG_PATH);
        println!("  -help, --help   Print this help message");
        return Ok(());
    }

    let config_path = args
        .iter()
        .skip_while(|arg| arg.as_str() != "-config")
        .nth(1)
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    // Loaded before logging init so the file can set the level
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Could not load config file: {}, using defaults", e);
        Config::default()
    });

    // RUST_LOG > config file > "info"
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting orgchart server...");
    info!("Configuration: {}", config_path);

    let db_conn = db::init_database(&config.database).await.map_err(|e| {
        tracing::error!("Database initialization failed: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;

    audit::init(db_conn.clone());
    info!("Audit log service initialized");

    let addr: SocketAddr = config.addr.parse().map_err(|e| {
        anyhow::anyhow!("Invalid listen address '{}': {}", config.addr, e)
    })?;

    let state = AppState::new(db_conn, config);
    let app = routes::create_router(state);

    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
