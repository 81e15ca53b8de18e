//! CLI Entry Point for rust-rcs
//!
//! Provides command-line interface for:
//! - Serving the remote-control protocol over UDP or TCP
//! - Sending a single command to a running server
//!
//! # Usage
//!
//! Start the server against the simulated instrument:
//! ```bash
//! rust_rcs serve --mock
//! rust_rcs serve --config config/rcs.toml --mock --tcp --port 1070
//! ```
//!
//! Query it:
//! ```bash
//! rust_rcs send 127.0.0.1:1069 "GetTrapVoltage"
//! rust_rcs send 127.0.0.1:1070 "SetMagnetDAC 4.7" --tcp
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use rust_rcs::config::{ServerConfig, TransportMode, DEFAULT_CONFIG_PATH};
use rust_rcs::context::ServerContext;
use rust_rcs::dispatcher::CommandDispatcher;
use rust_rcs::hardware::mock::{MockInstrument, MockTuneStore};
use rust_rcs::{logging, network};

#[derive(Parser)]
#[command(name = "rust_rcs")]
#[command(about = "Remote-control server for a multicollector mass spectrometer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the remote-control server
    Serve {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Serve against the in-memory simulated instrument
        #[arg(long)]
        mock: bool,

        /// Listen on UDP (overrides the config file)
        #[arg(long, conflicts_with = "tcp")]
        udp: bool,

        /// Listen on TCP (overrides the config file)
        #[arg(long)]
        tcp: bool,

        /// Port (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Interval between simulated spectra in milliseconds
        #[arg(long, default_value = "1000")]
        scan_period_ms: u64,
    },

    /// Send one command to a running server and print the reply
    Send {
        /// Server address, e.g. 127.0.0.1:1069
        addr: String,

        /// Command line, e.g. "GetTrapVoltage"
        command: String,

        /// Use TCP instead of UDP
        #[arg(long)]
        tcp: bool,

        /// Seconds to wait for the reply
        #[arg(long, default_value = "5")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            mock,
            udp,
            tcp,
            port,
            scan_period_ms,
        } => serve(config, mock, udp, tcp, port, scan_period_ms).await,
        Commands::Send {
            addr,
            command,
            tcp,
            timeout,
        } => {
            let mode = if tcp { TransportMode::Tcp } else { TransportMode::Udp };
            let reply =
                network::send_command(&addr, mode, &command, Duration::from_secs(timeout)).await?;
            println!("{reply}");
            Ok(())
        }
    }
}

async fn serve(
    config_path: PathBuf,
    mock: bool,
    udp: bool,
    tcp: bool,
    port: Option<u16>,
    scan_period_ms: u64,
) -> Result<()> {
    let mut config = ServerConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if udp {
        config.transport.mode = TransportMode::Udp;
    }
    if tcp {
        config.transport.mode = TransportMode::Tcp;
    }
    if let Some(port) = port {
        config.transport.port = port;
    }
    config.validate().map_err(anyhow::Error::msg)?;

    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    if !mock {
        bail!("No instrument driver is built into this binary; start with --mock");
    }

    tracing::info!(
        "Starting {} ({:?} on {})",
        config.application.name,
        config.transport.mode,
        config.transport.socket_addr()
    );

    let instrument = MockInstrument::argus();
    let transport = config.transport.clone();
    let context = Arc::new(ServerContext::new(
        config,
        Arc::new(instrument.clone()),
        Arc::new(MockTuneStore::sample()),
    ));

    context.prepare().await;
    let aggregator = context.start_scan_aggregator();
    let simulation = instrument.start_simulated_scans(Duration::from_millis(scan_period_ms));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl+C received"),
            Err(e) => {
                tracing::error!("Could not listen for Ctrl+C: {}", e);
                // dropping the sender would stop the listener
                std::future::pending::<()>().await;
            }
        }
        let _ = shutdown_tx.send(true);
    });

    let served = network::serve(
        &transport,
        CommandDispatcher::new(Arc::clone(&context)),
        shutdown_rx,
    )
    .await;

    simulation.abort();
    context.stop_scan_aggregator(aggregator).await;

    served.context("transport listener failed")
}
