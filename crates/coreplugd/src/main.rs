//! coreplugd — the coreplug daemon.
//!
//! Runs the hotplug driver over a simulated platform, feeds it a synthetic
//! workload and exposes the tunables on stdin.
//!
//! # Usage
//!
//! ```text
//! coreplugd run --units 8 --workload step:1:6:20 --duration-secs 60
//! coreplugd config --config coreplug.toml
//! ```
//!
//! Stdin commands: `<key>` shows a tunable, `<key> <value>` stores one,
//! `keys`, `states`, `suspend` and `resume`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coreplug_core::{HotplugConfig, PowerEvent};
use coreplug_driver::{Driver, PassReport, Platform, Tunables};
use coreplug_sim::{PowerStateBus, SimPlatform, Workload};

const DEFAULT_LOG_FILTER: &str =
    "info,coreplugd=debug,coreplug_driver=debug,coreplug_engine=debug";

#[derive(Parser)]
#[command(name = "coreplugd", about = "Adaptive core hotplug daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop on a simulated platform.
    Run {
        /// Path to coreplug.toml. Built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of processing units on the platform.
        #[arg(long, default_value = "8")]
        units: usize,

        /// idle, steady:<tasks>, step:<low>:<high>:<period>, ramp:<peak>:<period>
        #[arg(long, default_value = "idle")]
        workload: Workload,

        /// Workload tick length in milliseconds.
        #[arg(long, default_value = "1000")]
        workload_tick_ms: u64,

        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Validate a config file and print the effective settings as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "8")]
        units: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Run {
            config,
            units,
            workload,
            workload_tick_ms,
            duration_secs,
        } => {
            run(
                load_config(config.as_deref())?,
                units,
                workload,
                Duration::from_millis(workload_tick_ms.max(1)),
                duration_secs.map(Duration::from_secs),
            )
            .await
        }
        Command::Config { config, units } => {
            let config = load_config(config.as_deref())?;
            config.validate(units)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HotplugConfig> {
    match path {
        Some(p) => HotplugConfig::from_file(p)
            .with_context(|| format!("loading config from {}", p.display())),
        None => Ok(HotplugConfig::default()),
    }
}

async fn run(
    config: HotplugConfig,
    units: usize,
    workload: Workload,
    workload_tick: Duration,
    duration: Option<Duration>,
) -> anyhow::Result<()> {
    let sim = Arc::new(SimPlatform::new(units));
    let bus = Arc::new(PowerStateBus::new());
    let driver = Arc::new(Driver::new(
        &config,
        Platform::new(sim.clone(), sim.clone(), bus.clone()),
    )?);
    driver.set_pass_callback(Arc::new(log_transition));

    info!(units, ?workload, "starting coreplugd");
    driver.init().await;
    let tunables = Tunables::new(driver.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workload_handle = tokio::spawn(drive_workload(
        sim.clone(),
        workload,
        workload_tick,
        shutdown_rx,
    ));

    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
            _ = run_limit(duration) => info!("run duration elapsed"),
        }
    };
    let handled =
        control_loop(BufReader::new(tokio::io::stdin()), shutdown, &tunables, &bus).await;
    info!(commands = handled, "control loop finished");

    let _ = shutdown_tx.send(true);
    driver.stop().await;
    let _ = workload_handle.await;

    for state in driver.core_states() {
        info!(
            unit = state.unit,
            online = state.online,
            load = state.load,
            "final unit state"
        );
    }
    Ok(())
}

async fn run_limit(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Serve stdin commands until `shutdown` completes. Returns the number of
/// commands handled.
///
/// `shutdown` is polled as one pinned future for the whole loop, so a
/// signal that fires while a command is being handled wins the next select.
async fn control_loop<R, S>(input: R, shutdown: S, tunables: &Tunables, bus: &PowerStateBus) -> usize
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut lines = input.lines();
    let mut input_open = true;
    let mut handled = 0;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    let reply = handle_command(&line, tunables, bus).await;
                    if !reply.is_empty() {
                        print!("{reply}");
                    }
                    handled += 1;
                }
                Ok(None) => input_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin closed");
                    input_open = false;
                }
            },
        }
    }
    handled
}

fn log_transition(report: &PassReport) {
    let outcome = &report.outcome;
    if outcome.is_noop() {
        return;
    }
    info!(
        load = report.load,
        target = outcome.target,
        online = outcome.online_after(),
        up = ?outcome.powered_up,
        down = ?outcome.powered_down,
        "online set changed"
    );
}

async fn drive_workload(
    sim: Arc<SimPlatform>,
    workload: Workload,
    tick_len: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(tick_len);
    let mut tick = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sim.spread_load(workload.load_at(tick));
                tick += 1;
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Execute one stdin command and return the text to print.
async fn handle_command(line: &str, tunables: &Tunables, bus: &PowerStateBus) -> String {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return String::new();
    };
    let value = words.next();

    match (first, value) {
        ("keys", None) => tunables.keys().map(|k| format!("{k}\n")).collect(),
        ("states", None) => tunables
            .driver()
            .core_states()
            .iter()
            .map(|s| {
                format!(
                    "unit {} online={} load={} up_at={:?}\n",
                    s.unit, s.online, s.load, s.powered_up_at_ms
                )
            })
            .collect(),
        ("suspend", None) => {
            let delivered = bus.emit(PowerEvent::Suspend);
            format!("suspend delivered to {delivered} listener(s)\n")
        }
        ("resume", None) => {
            let delivered = bus.emit(PowerEvent::Active);
            format!("resume delivered to {delivered} listener(s)\n")
        }
        (key, None) => tunables
            .show(key)
            .unwrap_or_else(|e| format!("error: {e}\n")),
        (key, Some(value)) => match tunables.store(key, value).await {
            Ok(()) => String::new(),
            Err(e) => format!("error: {e}\n"),
        },
    }
}
