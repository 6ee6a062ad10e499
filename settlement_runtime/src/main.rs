//! `settlement`: drive a saved settlement from the command line.
//!
//! Every invocation loads the save (resolving jobs that finished while
//! closed), advances to the wall clock, runs at most one command or a
//! script of commands, saves, and prints a JSON status report.

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use settlement_core::catalog::{BuildingCatalog, PlotRegistry};
use settlement_core::commands::Command;
use settlement_core::engine::JobStatus;
use settlement_core::scheduler::QueueInfo;
use settlement_core::{ResourceVector, Settlement, SystemClock, TrainingSnapshot};
use settlement_runtime::config::RuntimeConfig;
use settlement_runtime::session::Session;

#[derive(Debug, Parser)]
#[command(name = "settlement", about = "Settlement building and economy simulation")]
struct Cli {
    /// Save file to load from and write back to.
    #[arg(long, default_value = "settlement_save.json")]
    save: PathBuf,
    /// Runtime config (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `settlement_core=trace`. Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print the current status (default).
    Status,
    /// Place a building on an empty plot.
    Place { plot: String, building: String },
    /// Upgrade the building on a plot.
    Upgrade { plot: String },
    /// Cancel the active job on a plot.
    Cancel {
        plot: String,
        #[arg(long, default_value_t = 0.5)]
        refund: f64,
    },
    /// Cut the remaining time of a plot's job by `fraction`.
    Speedup { plot: String, fraction: f64 },
    /// Train `amount` units of a troop in a barracks slot.
    Train {
        slot: usize,
        troop: String,
        #[arg(default_value_t = 1)]
        amount: u32,
    },
    /// Abort the training job in a barracks slot.
    CancelTraining {
        slot: usize,
        #[arg(long, default_value_t = 0.5)]
        refund: f64,
    },
    /// Complete every active job and training immediately.
    FinishAll,
    /// Apply a JSON array of commands in order.
    Script { path: PathBuf },
}

#[derive(Debug, Serialize)]
struct PlotReport {
    plot_id: String,
    building_id: String,
    level: u8,
    #[serde(flatten)]
    status: JobStatus,
    next_upgrade_cost: Option<ResourceVector>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    now: u64,
    townhall_level: u8,
    resources: ResourceVector,
    production_per_second: ResourceVector,
    queue: QueueInfo,
    plots: Vec<PlotReport>,
    training: TrainingSnapshot,
}

fn status_report(settlement: &Settlement) -> StatusReport {
    let plots = settlement
        .get_all_instances()
        .into_iter()
        .map(|inst| PlotReport {
            plot_id: inst.plot_id.clone(),
            building_id: inst.building_id.clone(),
            level: inst.level,
            status: settlement.get_status(&inst.plot_id).unwrap_or_default(),
            next_upgrade_cost: settlement.upgrade_cost_preview(&inst.plot_id),
        })
        .collect();
    StatusReport {
        now: settlement.now(),
        townhall_level: settlement.townhall_level(),
        resources: settlement.resources().display_balances(),
        production_per_second: settlement.get_production_per_second(),
        queue: settlement.get_queue_info(),
        plots,
        training: settlement.training_snapshot(),
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn to_commands(command: CliCommand) -> Result<Vec<Command>, Box<dyn Error>> {
    let commands = match command {
        CliCommand::Status | CliCommand::FinishAll => Vec::new(),
        CliCommand::Place { plot, building } => vec![Command::Place {
            plot_id: plot,
            building_id: building,
        }],
        CliCommand::Upgrade { plot } => vec![Command::Upgrade { plot_id: plot }],
        CliCommand::Cancel { plot, refund } => vec![Command::Cancel {
            plot_id: plot,
            refund_fraction: refund,
        }],
        CliCommand::Speedup { plot, fraction } => vec![Command::Speedup {
            plot_id: plot,
            fraction,
        }],
        CliCommand::Train {
            slot,
            troop,
            amount,
        } => vec![Command::Train {
            slot,
            troop_id: troop,
            amount,
        }],
        CliCommand::CancelTraining { slot, refund } => vec![Command::CancelTraining {
            slot,
            refund_fraction: refund,
        }],
        CliCommand::Script { path } => serde_json::from_str(&fs::read_to_string(&path)?)?,
    };
    Ok(commands)
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };

    let settlement = Settlement::new(
        Arc::new(BuildingCatalog::standard()),
        Arc::new(PlotRegistry::standard()),
        config.settlement,
        Arc::new(SystemClock),
    );
    let (mut session, report) = Session::open(settlement, &cli.save, config.autosave_interval_ms)?;
    if let Some(report) = report {
        info!(
            loaded = report.loaded,
            dropped = report.dropped,
            repaired = report.repaired,
            completed_on_load = report.completed_on_load,
            "load report"
        );
    }

    let now = session.settlement().now();
    session.advance(now)?;

    let command = cli.command.unwrap_or(CliCommand::Status);
    let finish_all = matches!(command, CliCommand::FinishAll);
    for cmd in to_commands(command)? {
        match session.apply(&cmd) {
            Ok(outcome) => println!("{}", serde_json::to_string(&outcome)?),
            Err(err) => {
                warn!(command = ?cmd, %err, "command refused");
                println!("{}", serde_json::json!({ "outcome": "refused", "reason": err.to_string() }));
            }
        }
    }
    if finish_all {
        let completed = session.settlement_mut().finish_all_now();
        info!(completed = completed.len(), "finished all jobs");
    }

    session.save()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&status_report(session.settlement()))?
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("settlement: {err}");
            ExitCode::FAILURE
        }
    }
}
