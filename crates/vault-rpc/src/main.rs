//! Vault RPC Server - JSON-RPC and file-serving backend for the model vault.
//!
//! This binary wraps the model-vault library with a JSON-RPC 2.0 endpoint,
//! a multipart upload endpoint and static/archive-scoped file serving.

mod auth;
mod files;
mod handlers;
mod server;
mod wrapper;

use anyhow::Result;
use clap::Parser;
use model_vault::config::{PathsConfig, StoreConfig};
use model_vault::{Registry, Role};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Accounts created on every fresh start unless `--no-seed` is given.
const BOOTSTRAP_USERS: [(&str, &str, Role); 2] = [
    ("admin@test.com", "admin123", Role::Admin),
    ("user@test.com", "password123", Role::User),
];

#[derive(Parser, Debug)]
#[command(name = "vault-rpc")]
#[command(about = "JSON-RPC server for the 3D model vault")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Directory holding uploads/ and model_archives/
    #[arg(long, default_value = ".")]
    data_root: PathBuf,

    /// SQLite database for the relational index
    #[arg(long, env = StoreConfig::DB_PATH_ENV)]
    db_path: Option<PathBuf>,

    /// Skip creating the bootstrap accounts
    #[arg(long)]
    no_seed: bool,

    /// Bcrypt cost for stored passwords
    #[arg(
        long,
        env = "VAULT_BCRYPT_COST",
        default_value_t = auth::BCRYPT_COST,
        value_parser = clap::value_parser!(u32).range(4..=31)
    )]
    bcrypt_cost: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Vault RPC Server");
    info!("Data root: {}", args.data_root.display());

    let db_path = args
        .db_path
        .unwrap_or_else(|| PathBuf::from(".").join(PathsConfig::DEFAULT_DB_FILENAME));

    let mut builder = Registry::builder(&args.data_root).db_path(Some(db_path));
    if !args.no_seed {
        for (email, password, role) in BOOTSTRAP_USERS {
            let hash = auth::hash_password(password, Some(args.bcrypt_cost)).await?;
            builder = builder.with_user(email, hash, role);
        }
    }
    let registry = builder.build().await?;

    info!(
        "Registry ready: {} models in {} archives",
        registry.model_count(),
        registry.archive_count()
    );

    // Start the server
    let addr = server::start_server(registry, &args.host, args.port, args.bcrypt_cost).await?;

    // Print port for supervisors to read (intentional stdout)
    println!("VAULT_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
