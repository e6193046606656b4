//! # CLI Interface
//!
//! Defines the command-line argument structure for `gacha-node` using
//! `clap` derive. One-shot subcommands operate directly on the persisted
//! ledger; `serve` hosts the same operations over HTTP.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use gacha_contracts::SourceEntry;
use gacha_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_OWNER_ADDRESS, DEFAULT_RPC_PORT};
use gacha_protocol::ledger::{Amount, Rank};

/// Gacha rank-swap node.
///
/// Hosts one swap deployment: a multi-token ledger, its value table and
/// its reserve account. Holders trade weighted lower ranks for a single
/// unit of a higher rank.
#[derive(Parser, Debug)]
#[command(
    name = "gacha-node",
    about = "Gacha rank-swap node",
    version,
    propagate_version = true
)]
pub struct GachaNodeCli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "GACHA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the gacha node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a data directory, write `deployment.json` and seed the ledger.
    Init(InitArgs),
    /// Grant or revoke the swap operator's right to move a holder's tokens.
    Approve(ApproveArgs),
    /// Print one balance.
    Balance(BalanceArgs),
    /// Print whether a holder has approved the swap operator.
    Allowance(AllowanceArgs),
    /// Check whether sources are worth at least one destination unit.
    ValueCheck(ValueCheckArgs),
    /// Convert sources into one destination unit.
    Convert(ConvertArgs),
    /// Serve the HTTP API and metrics endpoint.
    Serve(ServeArgs),
    /// Print version information and exit.
    Version,
}

/// Data directory shared by every stateful subcommand.
#[derive(Args, Debug, Clone)]
pub struct DataDirArg {
    /// Directory holding `deployment.json` and the ledger database.
    #[arg(long, short = 'd', env = "GACHA_DATA_DIR", default_value = ".gacha")]
    pub data_dir: PathBuf,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Collection owner; the only account allowed to mint.
    #[arg(long, default_value = DEFAULT_OWNER_ADDRESS)]
    pub owner: String,

    /// Units of every rank left with the owner.
    #[arg(long, default_value_t = 12)]
    pub holder_stock: Amount,

    /// Units of every rank moved into the reserve.
    #[arg(long, default_value_t = 1)]
    pub reserve_stock: Amount,

    /// Overwrite an existing deployment.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `approve` subcommand.
#[derive(Parser, Debug)]
pub struct ApproveArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Holder granting (or revoking) approval.
    #[arg(long)]
    pub holder: String,

    /// Revoke instead of grant.
    #[arg(long)]
    pub revoke: bool,
}

/// Arguments for the `balance` subcommand.
#[derive(Parser, Debug)]
pub struct BalanceArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    #[arg(long)]
    pub account: String,

    /// Rank id, e.g. `8` or `rank8`.
    #[arg(long)]
    pub rank: Rank,
}

/// Arguments for the `allowance` subcommand.
#[derive(Parser, Debug)]
pub struct AllowanceArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    #[arg(long)]
    pub holder: String,
}

/// Arguments for the `value-check` subcommand.
#[derive(Parser, Debug)]
pub struct ValueCheckArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Source entry as `RANK:AMOUNT`. Repeatable.
    #[arg(long = "source", short = 's', required = true)]
    pub sources: Vec<SourceEntry>,

    /// Destination rank.
    #[arg(long)]
    pub dest: Rank,
}

/// Arguments for the `convert` subcommand.
#[derive(Parser, Debug)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Account whose sources are converted.
    #[arg(long)]
    pub holder: String,

    /// Source entry as `RANK:AMOUNT`. Repeatable.
    #[arg(long = "source", short = 's')]
    pub sources: Vec<SourceEntry>,

    /// Destination rank.
    #[arg(long)]
    pub dest: Rank,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Port for the HTTP API.
    #[arg(long, env = "GACHA_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "GACHA_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Address to bind both listeners on.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,
}
