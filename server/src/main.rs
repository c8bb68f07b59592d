// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # VELA Wallet Server
//!
//! Entry point for the `vela-server` binary. Parses CLI arguments,
//! initializes logging and metrics, bootstraps the treasury reserve, and
//! serves the HTTP API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the wallet server
//! - `init`    — initialize the data directory and the first administrator
//! - `version` — print build version information

mod api;
mod auth;
mod cli;
mod directory;
mod error;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use vela_wallet::ledger::Ledger;
use vela_wallet::money::Amount;
use vela_wallet::qr::QrCodes;
use vela_wallet::request::PaymentRequests;
use vela_wallet::store::WalletStore;

use auth::Sessions;
use cli::{Commands, VelaServerCli};
use directory::Directory;
use logging::LogFormat;
use metrics::ServerMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VelaServerCli::parse();

    match cli.command {
        Commands::Run(args) => run_server(args).await,
        Commands::Init(args) => init_server(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full wallet server: API endpoint and metrics endpoint.
async fn run_server(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "vela_server=info,vela_wallet=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        http_port = args.http_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting vela-server"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let store = WalletStore::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Metrics ---
    let server_metrics = Arc::new(ServerMetrics::new());

    // --- Reserve and administrator bootstrap ---
    let reserve = api::initialize_reserve(
        &store,
        Amount::from_centavos(args.reserve_float_centavos),
    )
    .context("failed to bootstrap the reserve account")?;

    let directory = Directory::new(store.clone()).context("failed to open the user directory")?;
    match (&args.admin_username, &args.admin_password) {
        (Some(username), Some(password)) => {
            api::ensure_admin(&directory, username, password)
                .context("failed to bootstrap the administrator")?;
        }
        (None, None) => {}
        _ => {
            tracing::warn!(
                "admin bootstrap skipped: both --admin-username and --admin-password are required"
            );
        }
    }

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger: Ledger::new(store.clone()),
        qr_codes: QrCodes::new(store.clone()),
        payment_requests: PaymentRequests::new(store.clone()),
        directory,
        sessions: Sessions::new(&store).context("failed to open the session store")?,
        reserve,
        metrics: Arc::clone(&server_metrics),
        store: store.clone(),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.http_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&server_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    store.flush().context("failed to flush the database")?;
    tracing::info!("vela-server stopped");
    Ok(())
}

/// Initializes a new data directory, the reserve account, and the first
/// administrator.
fn init_server(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("vela_server=info,vela_wallet=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing server");

    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let store = WalletStore::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    let reserve = api::initialize_reserve(
        &store,
        Amount::from_centavos(args.reserve_float_centavos),
    )
    .context("failed to bootstrap the reserve account")?;

    let directory = Directory::new(store.clone()).context("failed to open the user directory")?;
    let admin_created = api::ensure_admin(&directory, &args.admin_username, &args.admin_password)
        .context("failed to bootstrap the administrator")?;

    store.flush().context("failed to flush the database")?;

    println!("Server initialized successfully.");
    println!("  Data directory  : {}", data_dir.display());
    println!("  Reserve account : {}", reserve);
    if admin_created {
        println!("  Administrator   : {}", args.admin_username);
    } else {
        println!("  Administrator   : already present, credentials unchanged");
    }

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("vela-server {}", env!("CARGO_PKG_VERSION"));
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
