//! uwb-host — read ranging results from the tag node and solve for position
//!
//! Subcommands:
//!   scan  start a ranging round on the node
//!   read  print the node's current measurement table
//!   calc  read the current table and solve once (no scan)
//!   run   periodic scan/read/solve loop (never exits on a bad cycle)

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use uwb_host::config::parse_int;
use uwb_host::{AnchorConfig, Controller, HostConfig, HostError, I2cDevice, PollLoop, TransportError};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "uwb-host", about = "UWB ranging aggregation host")]
struct Args {
    /// Host config file (bundled defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// I2C character device
    #[arg(long)]
    device: Option<PathBuf>,
    /// Node slave address (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_slave_addr)]
    address: Option<u16>,
    /// Anchor deployment file (anchorId,x,y,z rows)
    #[arg(long)]
    anchors: Option<PathBuf>,
    /// Print results as JSON lines
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    Scan,
    Read,
    Calc,
    Run {
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },
}

fn parse_slave_addr(s: &str) -> Result<u16, String> {
    parse_int(s).ok_or_else(|| format!("invalid slave address {s:?}"))
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uwb_host=info".into()),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let code = e.downcast_ref::<HostError>().map_or(1, HostError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = HostConfig::load(args.config.as_deref())
        .map_err(HostError::from)
        .context("loading host config")?;
    if let Some(device) = args.device {
        cfg.transport.device = device;
    }
    if let Some(addr) = args.address {
        cfg.transport.slave_addr = addr;
    }
    if let Some(path) = args.anchors {
        cfg.anchors_file.0 = path;
    }

    let device = I2cDevice::open(&cfg.transport.device, cfg.transport.slave_addr)
        .map_err(|e| HostError::from(TransportError::from(e)))
        .with_context(|| format!("opening {}", cfg.transport.device.display()))?;
    let mut controller = Controller::new(device, cfg.transport.anchor_count);

    match args.command {
        Cmd::Scan => {
            controller.trigger_scan().map_err(HostError::from)?;
            info!("Scan triggered");
        }
        Cmd::Read => {
            let slots = controller.read_slots().map_err(HostError::from)?;
            if args.json {
                println!("{}", serde_json::to_string(&slots)?);
            } else {
                for m in &slots {
                    let mark = if m.is_valid() { "" } else { "  (empty)" };
                    println!("{:>6} {:>10.3} m{}", m.anchor.raw(), m.distance_m, mark);
                }
            }
        }
        Cmd::Calc | Cmd::Run { .. } => {
            let anchors = AnchorConfig::load(&cfg.anchors_file.0)
                .map_err(HostError::from)
                .context("loading anchor deployment")?;
            let mut poll = PollLoop::new(controller, anchors, cfg.cycle.clone(), cfg.solver.clone());
            let json = args.json;
            let print = move |report: &uwb_host::CycleReport| {
                if json {
                    match serde_json::to_string(report) {
                        Ok(line) => println!("{line}"),
                        Err(e) => error!("serialising report: {e}"),
                    }
                } else {
                    let p = report.estimate.position;
                    println!("{:.3} {:.3} {:.3}", p.x, p.y, p.z);
                }
            };

            if let Cmd::Run { cycles } = args.command {
                info!("Polling {} every {} ms", cfg.transport.device.display(), cfg.cycle.idle_ms);
                let stats = poll.run(cycles, print);
                info!(
                    "Stopped after {} cycles ({} estimates, {} skipped)",
                    stats.cycles, stats.estimates, stats.failures
                );
            } else {
                let report = poll.read_and_locate()?;
                print(&report);
            }
        }
    }
    Ok(())
}
