//! # CLI Interface
//!
//! Defines the command-line argument structure for `vela-server` using
//! `clap` derive. Supports three subcommands: `run`, `init`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vela_wallet::config::{
    DEFAULT_HTTP_PORT, DEFAULT_METRICS_PORT, DEFAULT_RESERVE_FLOAT_CENTAVOS,
};

/// VELA wallet server.
///
/// The backend for the VELA digital wallet. Holds accounts and balances,
/// settles transfers, QR charges, and payment requests, serves the REST
/// API, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "vela-server",
    about = "VELA wallet server",
    version,
    propagate_version = true
)]
pub struct VelaServerCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the VELA server binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the wallet server.
    Run(RunArgs),
    /// Initialize a new deployment — creates the data directory, the
    /// reserve account, and the first administrator.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the server data directory where the database is stored.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "VELA_DATA_DIR", default_value = "~/.vela")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "VELA_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VELA_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "VELA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Username for the bootstrap administrator, created if no
    /// administrator exists yet. Requires `--admin-password`.
    #[arg(long, env = "VELA_ADMIN_USERNAME")]
    pub admin_username: Option<String>,

    /// Password for the bootstrap administrator.
    ///
    /// **Never pass this flag in production** — use the environment
    /// variable or a secrets manager instead.
    #[arg(long, env = "VELA_ADMIN_PASSWORD")]
    pub admin_password: Option<String>,

    /// Opening float of the reserve account, in centavos.
    ///
    /// Only consulted when the reserve does not exist yet.
    #[arg(long, env = "VELA_RESERVE_FLOAT", default_value_t = DEFAULT_RESERVE_FLOAT_CENTAVOS)]
    pub reserve_float_centavos: u64,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "VELA_DATA_DIR", default_value = "~/.vela")]
    pub data_dir: PathBuf,

    /// Username for the first administrator.
    #[arg(long, env = "VELA_ADMIN_USERNAME", default_value = "admin")]
    pub admin_username: String,

    /// Password for the first administrator.
    #[arg(long, env = "VELA_ADMIN_PASSWORD")]
    pub admin_password: String,

    /// Opening float of the reserve account, in centavos.
    #[arg(long, env = "VELA_RESERVE_FLOAT", default_value_t = DEFAULT_RESERVE_FLOAT_CENTAVOS)]
    pub reserve_float_centavos: u64,
}
