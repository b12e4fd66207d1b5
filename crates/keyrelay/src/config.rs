//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use keyrelay_gate::{GateError, RateLimitConfig};
use keyrelay_store::StoreOptions;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "keyrelay",
    version,
    about = "Access-controlled DRM license broker with key escrow"
)]
pub struct Cli {
    /// SQLite database path.
    #[arg(long, env = "KEYRELAY_DB", default_value = "keyrelay.db", global = true)]
    pub db: PathBuf,

    /// Bound on each storage operation, in milliseconds.
    #[arg(
        long,
        env = "KEYRELAY_STORE_TIMEOUT_MS",
        default_value_t = 5_000,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub store_timeout_ms: u64,

    /// Emit logs as JSON lines.
    #[arg(long, env = "KEYRELAY_LOG_JSON", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the HTTP broker.
    Serve(ServeArgs),
    /// Print every passkey holding the super-user flag.
    Superusers,
    /// Issue passkeys directly against the database.
    Issue(IssueArgs),
    /// Revoke a passkey directly against the database.
    Revoke(RevokeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "KEYRELAY_BIND", default_value = DEFAULT_BIND_ADDR)]
    pub bind: SocketAddr,

    /// Path to the device client identity blob.
    #[arg(long, env = "KEYRELAY_CLIENT_ID")]
    pub client_id: PathBuf,

    /// Path to the device private key.
    #[arg(long, env = "KEYRELAY_PRIVATE_KEY")]
    pub private_key: PathBuf,

    /// CDM helper program.
    #[arg(long, env = "KEYRELAY_CDM_COMMAND")]
    pub cdm_command: PathBuf,

    /// Extra argument for the CDM helper. Repeatable.
    #[arg(long = "cdm-arg", allow_hyphen_values = true)]
    pub cdm_args: Vec<String>,

    /// Bound on each CDM helper call, in milliseconds.
    #[arg(
        long,
        env = "KEYRELAY_CDM_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub cdm_timeout_ms: u64,

    /// Requests allowed per passkey per window.
    #[arg(
        long,
        env = "KEYRELAY_RATE_LIMIT",
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub rate_limit: u64,

    /// Rate window length in seconds.
    #[arg(
        long,
        env = "KEYRELAY_RATE_WINDOW_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub rate_window_secs: u64,

    /// Value of the `Server` response header.
    #[arg(long, env = "KEYRELAY_SERVER_NAME", default_value = "keyrelay")]
    pub server_name: String,
}

#[derive(Debug, Clone, Args)]
pub struct IssueArgs {
    /// Number of passkeys to issue.
    #[arg(long, default_value_t = 1)]
    pub quantity: i64,

    /// Grant the super-user flag.
    #[arg(long)]
    pub super_user: bool,

    /// Grant the sudoer flag.
    #[arg(long)]
    pub sudoer: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RevokeArgs {
    /// The passkey to revoke.
    pub token: String,
}

impl Cli {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            op_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }
}

impl ServeArgs {
    pub fn rate_limits(&self) -> Result<RateLimitConfig, GateError> {
        RateLimitConfig::new(self.rate_limit, Duration::from_secs(self.rate_window_secs))
    }

    pub fn cdm_timeout(&self) -> Duration {
        Duration::from_millis(self.cdm_timeout_ms)
    }
}
