//! # aquamet-sim
//!
//! Runs the handover engine against a simulated two-AP walk-away scenario
//! and prints engine events as JSON lines, followed by the final snapshot.
//!
//! ## Usage
//!
//! ```bash
//! # Offline, as fast as possible
//! aquamet-sim --ticks 120 --seed 42
//!
//! # With an engine config file
//! aquamet-sim --config aquamet.toml
//!
//! # Through the threaded runtime, one tick per configured interval
//! aquamet-sim --realtime --ticks 40
//! ```

use std::path::PathBuf;
use std::thread;

use anyhow::Context;
use aquamet_core::{EngineConfig, EngineEvent, EngineRuntime, EngineSnapshot, HandoverEngine};
use aquamet_sim::network::SimNetwork;
use aquamet_sim::scenario::{Scenario, ScenarioConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Simulated Wi-Fi handover run.
#[derive(Parser, Debug)]
#[command(name = "aquamet-sim", about = "Drive the aquamet handover engine from a simulated network")]
struct Cli {
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 120)]
    ticks: u64,

    /// Scenario random seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Engine config (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run through the worker-thread runtime in wall-clock time.
    #[arg(long, default_value_t = false)]
    realtime: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            EngineConfig::from_toml_str(&text)?
        }
        None => EngineConfig::default(),
    };

    let mut scenario_cfg = ScenarioConfig::walkaway(cli.seed);
    scenario_cfg.tick = config.tick;
    if config.monitored.is_empty() {
        config.monitored = scenario_cfg.monitored();
    }

    tracing::info!(
        ticks = cli.ticks,
        seed = cli.seed,
        realtime = cli.realtime,
        window_depth = config.window_depth,
        threshold_kbps = config.threshold_kbps,
        tolerance = config.tolerance,
        "aquamet-sim starting"
    );

    let network = SimNetwork::new();
    let mut scenario = Scenario::new(scenario_cfg, network.clone());

    let snapshot = if cli.realtime {
        run_realtime(config, network, &mut scenario, cli.ticks)?
    } else {
        let mut engine = HandoverEngine::new(config, network);
        for report in aquamet_sim::drive(&mut engine, &mut scenario, cli.ticks) {
            for ev in &report.events {
                print_event(ev)?;
            }
        }
        engine.snapshot()
    };

    println!("{}", snapshot.to_json()?);
    tracing::info!(
        handovers = scenario.network().reassociations().len(),
        "aquamet-sim finished"
    );
    Ok(())
}

fn run_realtime(
    config: EngineConfig,
    network: SimNetwork,
    scenario: &mut Scenario,
    ticks: u64,
) -> anyhow::Result<EngineSnapshot> {
    let tick = config.tick;
    let mut runtime = EngineRuntime::start(config, network)?;
    for t in scenario.bootstrap() {
        runtime.send(t)?;
    }
    thread::sleep(tick);

    for _ in 0..ticks {
        for t in scenario.step() {
            runtime.send(t)?;
        }
        thread::sleep(tick);
        for ev in runtime.events().try_iter() {
            print_event(&ev)?;
        }
    }

    let snapshot = runtime.snapshot();
    runtime.shutdown();
    Ok(snapshot)
}

fn print_event(ev: &EngineEvent) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(ev)?);
    Ok(())
}
