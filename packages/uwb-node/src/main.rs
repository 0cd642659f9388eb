//! main.rs — simulated UWB ranging network driven by the real host loop
//!
//! Runs two loops:
//!   1. Network task: advances the simulated nodes on a Tokio interval,
//!      `--speed` virtual milliseconds per real millisecond, and answers host
//!      commands in between ticks
//!   2. Host loop: the `uwb-host` poll loop on a blocking thread, talking to
//!      the network through a channel bridge
//!
//! Every position estimate is printed to stdout as one JSON line together
//! with the simulated truth.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use uwb_host::config::CycleConfig;
use uwb_host::{Controller, PollLoop, SolverConfig};
use uwb_node::sim::{BridgeRequest, ChannelTransport, ScenarioConfig, SimConfig, SimNetwork};
use uwb_node::TwrMode;

const TICK_MS: u64 = 10;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "uwb-sim", about = "Simulated UWB ranging network with the aggregation host")]
struct Args {
    /// Simulation config (bundled room layout when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Simulation speed multiplier (1.0 = real-time)
    #[arg(long, default_value = "1.0")]
    speed: f64,
    /// Stop after this many host cycles
    #[arg(long)]
    cycles: Option<u64>,
    /// Fault scenario preset: none, dropout, noise, clock-slip
    #[arg(long)]
    scenario: Option<String>,
    /// Override the config seed
    #[arg(long)]
    seed: Option<u64>,
    /// Use single-sided ranging instead of double-sided
    #[arg(long)]
    single_sided: bool,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uwb_node=info,uwb_host=info".into()),
        )
        .init();

    let args = Args::parse();
    if !(args.speed.is_finite() && args.speed > 0.0) {
        bail!("--speed must be a positive number");
    }

    let mut cfg = SimConfig::load(args.config.as_deref()).context("loading simulation config")?;
    if let Some(name) = &args.scenario {
        cfg.scenario = ScenarioConfig::preset(name).with_context(|| format!("unknown scenario {name:?}"))?;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if args.single_sided {
        cfg.twr_mode = TwrMode::SingleSided;
    }

    let network = SimNetwork::new(&cfg).context("building simulated network")?;
    let anchors = network.anchor_config()?;
    let truth = network.tag_position();
    info!(
        "🛰  uwb-sim starting: {} anchors, tag at {}, speed ×{}, scenario {:?}",
        anchors.len(), truth, args.speed, cfg.scenario.active
    );

    let (req_tx, req_rx) = mpsc::channel::<BridgeRequest>(8);
    let net_task = tokio::spawn(run_network(network, req_rx, args.speed));

    let speed = args.speed;
    let cycles = args.cycles;
    let anchor_count = cfg.anchor_count;
    let host = tokio::task::spawn_blocking(move || {
        let controller = Controller::new(ChannelTransport::new(req_tx, speed), anchor_count);
        let mut poll = PollLoop::new(controller, anchors, CycleConfig::default(), SolverConfig::default());
        poll.run(cycles, |report| {
            let p = report.estimate.position;
            let line = json!({
                "cycle": report.cycle,
                "position": p,
                "truth": truth,
                "error_m": p.dist(&truth),
                "rms_residual_m": report.estimate.rms_residual_m,
                "anchors": report.estimate.n_anchors,
                "converged": report.estimate.converged,
            });
            println!("{line}");
        })
    });

    let host_stats = host.await.context("host loop panicked")?;
    // The host's transport is gone, so the network task sees its channel close
    let net_stats = net_task.await.context("network task panicked")?;
    info!(
        "Done: {} cycles, {} estimates, {} skipped | {} ms simulated, {} frames, {} failed sessions",
        host_stats.cycles, host_stats.estimates, host_stats.failures,
        net_stats.elapsed_ms, net_stats.frames_sent, net_stats.failed_sessions
    );
    Ok(())
}

async fn run_network(
    mut network: SimNetwork,
    mut requests: mpsc::Receiver<BridgeRequest>,
    speed: f64,
) -> uwb_node::sim::SimStats {
    let mut ticker = interval(Duration::from_millis(TICK_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut budget_ms = 0.0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                budget_ms += TICK_MS as f64 * speed;
                let whole = budget_ms.floor();
                budget_ms -= whole;
                network.run_for(whole as u64);
            }
            req = requests.recv() => match req {
                Some(BridgeRequest { command, reply }) => {
                    let _ = reply.send(network.host_request(command));
                }
                None => break,
            },
        }
    }
    network.stats()
}
