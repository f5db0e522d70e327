//! swvirtd daemon entry point.
//!
//! Attaches a switch chip, exposes one interface per port and keeps them
//! up until SIGINT or SIGTERM. Without a hardware driver the chip is the
//! simulated switch described by the `[simulation]` configuration section.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use swvirt_chip::{SimulatedProbe, SimulatedSwitch, SwitchChip};
use swvirt_common::{SwvirtConfig, DEFAULT_CONFIG_PATH};
use swvirtd::{FeatureEndpoint, InterfaceNamespace, LifecycleCoordinator, StatusEndpoint};

/// Switch port virtualization daemon
#[derive(Parser, Debug)]
#[command(name = "swvirtd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Print the chip state as JSON once attached
    #[arg(long)]
    dump_state: bool,
}

/// Initialize tracing/logging. `RUST_LOG` overrides `--log-level`.
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Builds the simulated chip for the configured layout.
fn simulated_probe(config: &SwvirtConfig) -> anyhow::Result<SimulatedProbe> {
    let sim = &config.simulation;
    let chip: Arc<dyn SwitchChip> = Arc::new(
        SimulatedSwitch::builder()
            .port_count(sim.port_count)
            .device_offset(sim.device_offset)
            .mtu_limit(sim.mtu_limit)
            .mtu_overhead(sim.mtu_overhead)
            .features(sim.feature_flags()?)
            .chip_address(config.interface.mac_address)
            .build(),
    );
    Ok(SimulatedProbe::empty().with_switch(config.lifecycle.probe_id, chip))
}

/// Resolves when the process is asked to stop.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => info!("Received SIGINT"),
            _ = term.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received SIGINT");
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = SwvirtConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate()?;

    let probe = simulated_probe(&config)?;
    let status = Arc::new(StatusEndpoint::new());
    let coordinator = LifecycleCoordinator::new(
        config.clone(),
        Arc::new(InterfaceNamespace::new(config.namespace.max_interfaces)),
        status.clone(),
    )
    .with_extension(Arc::new(FeatureEndpoint::ptp()))
    .with_extension(Arc::new(FeatureEndpoint::dlr()));

    let attached = coordinator.start(None, &probe).await?;
    for iface in attached.interfaces() {
        iface.open()?;
    }

    if args.dump_state {
        if let Some(json) = status.to_json()? {
            println!("{}", json);
        }
    }

    info!(
        interfaces = attached.interfaces().len(),
        "swvirtd running, waiting for shutdown signal"
    );
    shutdown_signal().await;

    let order = coordinator.shutdown(attached).await;
    info!(?order, "All interfaces released");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("swvirtd: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting swvirtd ---");

    match run(args).await {
        Ok(()) => {
            info!("swvirtd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("swvirtd error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
