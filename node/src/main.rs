//! # Gacha Swap Node
//!
//! Entry point for the `gacha-node` binary. Parses CLI arguments,
//! initializes logging, and either runs a one-shot command against the
//! persisted ledger or serves the HTTP API and metrics endpoint.
//!
//! - `init`        create a data directory and seed the ledger
//! - `approve`     grant or revoke swap approval for a holder
//! - `balance`     print one balance
//! - `allowance`   print a holder's approval
//! - `value-check` run the value gate
//! - `convert`     run a conversion
//! - `serve`       HTTP API + Prometheus metrics
//! - `version`     print build version information

mod api;
mod cli;
mod deployment;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::signal;

use gacha_contracts::ConversionRequest;

use cli::{Commands, GachaNodeCli};
use deployment::{Deployment, NodeContext};
use logging::LogFormat;
use metrics::SwapMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = GachaNodeCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::Init(args) => init_deployment(args),
        Commands::Approve(args) => approve(args),
        Commands::Balance(args) => balance(args),
        Commands::Allowance(args) => allowance(args),
        Commands::ValueCheck(args) => value_check(args),
        Commands::Convert(args) => convert(args),
        Commands::Serve(args) => serve(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Writes `deployment.json` and the seeded ledger.
fn init_deployment(args: cli::InitArgs) -> Result<()> {
    let data_dir = &args.data.data_dir;
    let ctx = NodeContext::init(
        data_dir,
        Deployment::with_owner(args.owner),
        args.holder_stock,
        args.reserve_stock,
        args.force,
    )?;

    println!("Deployment initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Collection     : {} ({})", ctx.deployment.collection.name, ctx.deployment.collection.symbol);
    println!("  Owner          : {}", ctx.deployment.owner);
    println!("  Reserve        : {}", ctx.deployment.reserve);
    println!("  State root     : {}", ctx.ledger.state_root_hex());
    for (rank, weight) in ctx.engine.table().entries() {
        println!("  Weight {:<7} : {}", rank.to_string(), weight);
    }
    Ok(())
}

fn approve(args: cli::ApproveArgs) -> Result<()> {
    let mut ctx = NodeContext::open(&args.data.data_dir)?;
    let operator = ctx.engine.operator().to_string();
    ctx.ledger
        .set_approval_for_all(&args.holder, &operator, !args.revoke)
        .with_context(|| format!("failed to update approval for {}", args.holder))?;
    ctx.persist()?;

    println!("{} -> {}: {}", args.holder, operator, if args.revoke { "revoked" } else { "approved" });
    Ok(())
}

fn balance(args: cli::BalanceArgs) -> Result<()> {
    let ctx = NodeContext::open(&args.data.data_dir)?;
    println!("{}", ctx.ledger.balance_of(&args.account, args.rank));
    Ok(())
}

fn allowance(args: cli::AllowanceArgs) -> Result<()> {
    let ctx = NodeContext::open(&args.data.data_dir)?;
    println!("{}", ctx.engine.allowance_check(&ctx.ledger, &args.holder));
    Ok(())
}

fn value_check(args: cli::ValueCheckArgs) -> Result<()> {
    let ctx = NodeContext::open(&args.data.data_dir)?;
    let valuation = ctx
        .engine
        .valuate(&args.sources, args.dest)
        .context("value check failed")?;
    println!(
        "{} (offered {}, required {})",
        valuation.is_sufficient(),
        valuation.offered,
        valuation.required
    );
    Ok(())
}

/// Runs one conversion and persists the ledger if it completed.
fn convert(args: cli::ConvertArgs) -> Result<()> {
    let mut ctx = NodeContext::open(&args.data.data_dir)?;
    let request = ConversionRequest {
        sources: args.sources,
        destination: args.dest,
    };

    let receipt = ctx
        .engine
        .convert(&mut ctx.ledger, &args.holder, &request)
        .context("conversion rejected")?;
    ctx.persist()?;

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

/// Serves the HTTP API and the metrics endpoint until shutdown.
async fn serve(args: cli::ServeArgs) -> Result<()> {
    let ctx = NodeContext::open(&args.data.data_dir)?;
    let swap_metrics = Arc::new(SwapMetrics::new().context("failed to register metrics")?);

    tracing::info!(
        port = args.port,
        metrics_port = args.metrics_port,
        data_dir = %args.data.data_dir.display(),
        initialized_at = ctx.initialized_at().as_deref().unwrap_or("unknown"),
        state_root = %ctx.ledger.state_root_hex(),
        "starting gacha-node"
    );

    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            gacha_protocol::config::PROTOCOL_VERSION,
        ),
        deployment: Arc::new(ctx.deployment),
        engine: Arc::new(ctx.engine),
        ledger: Arc::new(Mutex::new(ctx.ledger)),
        db: ctx.db.clone(),
        metrics: Arc::clone(&swap_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&swap_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
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
            tracing::info!("shutdown signal received");
        }
    }

    ctx.db.flush().context("failed to flush database")?;
    tracing::info!("gacha-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("gacha-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", gacha_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
