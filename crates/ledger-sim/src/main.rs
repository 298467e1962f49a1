mod report;

use anyhow::{Context, Result};
use clap::Parser;
use ledger_core::constants::{DEFAULT_DIFFICULTY, DEFAULT_MAX_DELAY_MS, DEFAULT_MIN_DELAY_MS};
use ledger_core::{pow, SimConfig, SimState, Simulation, StepEvent, Summary};
use rand::{rngs::StdRng, SeedableRng};
use report::{Format, Reporter};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-sim")]
#[command(about = "Proof-of-work ledger simulation with hidden transaction rules")]
struct Args {
    /// Stop after this many committed blocks. Omit to run until Ctrl-C.
    #[arg(short = 'n', long)]
    blocks: Option<u64>,

    /// Leading zero hex digits required in every block hash (1-6)
    #[arg(short, long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Shortest pause after a committed block, in milliseconds
    #[arg(long, default_value_t = DEFAULT_MIN_DELAY_MS)]
    min_delay_ms: u64,

    /// Longest pause after a committed block, in milliseconds
    #[arg(long, default_value_t = DEFAULT_MAX_DELAY_MS)]
    max_delay_ms: u64,

    /// Nonces to try per block before giving up. Defaults to 32 * 16^difficulty,
    /// at least one million.
    #[arg(long)]
    max_attempts: Option<u64>,

    /// Seed the random source for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Emit one JSON object per line instead of text
    #[arg(long)]
    json: bool,
}

impl Args {
    fn sim_config(&self) -> SimConfig {
        SimConfig {
            blocks: self.blocks,
            difficulty: self.difficulty,
            min_delay_ms: self.min_delay_ms,
            max_delay_ms: self.max_delay_ms,
            max_attempts: self
                .max_attempts
                .unwrap_or_else(|| pow::default_max_attempts(self.difficulty)),
        }
    }

    fn format(&self) -> Format {
        if self.json {
            Format::Json
        } else {
            Format::Text
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.sim_config();
    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        return ExitCode::from(2);
    }

    // Bounded runs keep the default SIGINT behaviour.
    let shutdown = args.blocks.is_none().then(shutdown_signal);
    match run(&args, config, shutdown).await {
        Ok(summary) if summary.validation.is_valid() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Drive the simulation to its summary. When `shutdown` flips to `true` the
/// run stops before the next step or cuts the current pause short.
async fn run(
    args: &Args,
    config: SimConfig,
    mut shutdown: Option<watch::Receiver<bool>>,
) -> Result<Summary> {
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let bound = config.blocks;
    let mut sim = Simulation::new(config, rng)?;
    let reporter = Reporter::new(args.format());
    emit(reporter.start(sim.config()));

    while sim.state() == SimState::Running {
        if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
            sim.stop()?;
            break;
        }

        let event = sim.step().context("simulation aborted")?;
        emit(reporter.event(&event, bound));

        if matches!(event, StepEvent::Committed { .. }) && sim.state() == SimState::Running {
            let delay = sim.next_delay();
            match shutdown.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = rx.changed() => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }

    sim.validate()?;
    let summary = sim.finish()?;
    emit(reporter.summary(&summary));
    Ok(summary)
}

/// Flips to `true` on the first Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping");
                let _ = tx.send(true);
            }
            Err(e) => {
                error!("failed to listen for ctrl-c: {e}");
                // Keep the sender alive so the run loop still sleeps normally.
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

fn emit(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}
