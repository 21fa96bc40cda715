//! zkprovd: Standalone binary for the zkprovd proving daemon.
//!
//! Loads configuration, builds the engine (which loads the circuit catalog),
//! binds the RPC and witness listeners, and handles signals.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use zkprovd_core::{Config, Engine, InsecureProver};
use zkprovd_server::ProveService;

#[derive(Parser, Debug)]
#[command(name = "zkprovd", about = "Groth16 proving service daemon")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "/etc/zkprovd/zkprovd.toml")]
    config: PathBuf,

    /// Override the RPC bind address (e.g. "0.0.0.0:9002").
    #[arg(long)]
    rpc_listen: Option<String>,

    /// Override the witness socket bind address (e.g. "0.0.0.0:9001").
    #[arg(long)]
    witness_listen: Option<String>,

    /// Override the circuit catalog directory.
    #[arg(long)]
    circuit_dir: Option<PathBuf>,

    /// Override log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("failed to load config from {:?}", cli.config))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(rpc_listen) = &cli.rpc_listen {
        config.daemon.rpc_listen = rpc_listen.clone();
    }
    if let Some(witness_listen) = &cli.witness_listen {
        config.daemon.witness_listen = witness_listen.clone();
    }
    if let Some(circuit_dir) = &cli.circuit_dir {
        config.circuits.dir = circuit_dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!("zkprovd starting");
    info!(
        rpc_listen = %config.daemon.rpc_listen,
        witness_listen = %config.daemon.witness_listen,
        circuit_dir = %config.circuits.dir.display(),
        "configuration loaded"
    );

    warn!("no proving backend compiled in: using the insecure development prover");
    let engine = Arc::new(Engine::new(config.clone(), Arc::new(InsecureProver))?);
    engine.start().await?;

    let witness_listener = TcpListener::bind(&config.daemon.witness_listen)
        .await
        .with_context(|| format!("failed to bind witness socket {}", config.daemon.witness_listen))?;
    let rpc_listener = TcpListener::bind(&config.daemon.rpc_listen)
        .await
        .with_context(|| format!("failed to bind RPC listener {}", config.daemon.rpc_listen))?;

    // Spawn signal handler
    let engine_shutdown = engine.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received SIGINT, shutting down");
        engine_shutdown.shutdown();
    });

    // Witness ingestion runs beside the RPC server
    let witness_engine = engine.clone();
    let witness_task = tokio::spawn(async move { witness_engine.serve_witness(witness_listener).await });

    let service = Arc::new(ProveService::new(engine.clone()));
    let mut shutdown_rx = engine.shutdown_signal();
    info!("zkprovd ready");

    zkprovd_server::http::serve(rpc_listener, service, async move {
        // resolves once shutdown is requested
        let _ = shutdown_rx.changed().await;
    })
    .await
    .context("RPC server error")?;

    witness_task.await.ok();
    info!("zkprovd stopped");
    Ok(())
}
