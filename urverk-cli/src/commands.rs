use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use opentelemetry::KeyValue;
use tracing::info;

use urverk_config::{ConfigError, UrverkConfig};
use urverk_core::{Kernel, SimDuration};
use urverk_replay::{builtin_registry, ReplayHarness};
use urverk_sync::{sleep_for, SimCondVar, SimMutex};
use urverk_telemetry::logging::EventLogger;
use urverk_telemetry::MetricsRecorder;

type CommandResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "urverk", version, about = "Discrete-event actor simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deterministically replay one or more action trace files
    Replay(ReplayArgs),
    /// Run the built-in demo workload (no trace required)
    Demo(DemoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Trace files: a single global file partitioned by actor id, or one
    /// file per actor
    #[arg(required = true)]
    pub traces: Vec<PathBuf>,

    /// Configuration file (YAML); defaults to config/urverk.yaml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Validate the run against this recorded state hash
    #[arg(long)]
    pub expected_hash: Option<String>,

    /// Print the Prometheus metrics dump after the run
    #[arg(long, default_value_t = false)]
    pub metrics: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Number of waiter/notifier pairs contending in the demo
    #[arg(long, default_value_t = 4)]
    pub pairs: usize,

    /// Configuration file (YAML); defaults to config/urverk.yaml
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub fn run_command(cli: Cli) -> CommandResult {
    match cli.command {
        Commands::Replay(args) => run_replay(args),
        Commands::Demo(args) => run_demo(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<UrverkConfig, ConfigError> {
    match path {
        Some(path) => UrverkConfig::load_from_path(path),
        None => UrverkConfig::load(),
    }
}

fn run_replay(args: ReplayArgs) -> CommandResult {
    let config = load_config(args.config.as_ref())?;
    EventLogger::init(&config.telemetry.level, config.telemetry.thread_names);
    let metrics = MetricsRecorder::new();

    let harness =
        ReplayHarness::new(builtin_registry()).with_context(config.engine.context_config());
    let report = harness.run_files(&args.traces)?;
    metrics.record_stats(&report.stats);

    let expected = args
        .expected_hash
        .as_deref()
        .or(config.replay.expected_hash.as_deref());
    if let Some(expected) = expected {
        report.verify_hash(expected)?;
        info!("state hash validated");
    }

    EventLogger::log_event(
        "replay_finished",
        vec![
            KeyValue::new("final_time", report.final_time.as_secs()),
            KeyValue::new("actions", report.actions_executed as i64),
        ],
    );
    println!("final time:  {}", report.final_time);
    println!("actions:     {}", report.actions_executed);
    println!("state hash:  {}", report.state_hash);
    if args.metrics {
        println!("{}", metrics.gather_metrics()?);
    }
    Ok(())
}

/// A self-contained workload: per pair, a waiter parks on a condvar under a
/// mutex and a notifier wakes it after a staggered sleep.
fn run_demo(args: DemoArgs) -> CommandResult {
    let config = load_config(args.config.as_ref())?;
    EventLogger::init(&config.telemetry.level, config.telemetry.thread_names);
    let metrics = MetricsRecorder::new();

    let mut kernel = Kernel::new(&config.engine.context_config())?;
    for pair in 0..args.pairs.max(1) {
        let mutex = SimMutex::create(&mut kernel);
        let condvar = SimCondVar::create(&mut kernel);
        let delay = SimDuration::from_secs((pair + 1) as f64);

        kernel.spawn(&format!("waiter-{pair}"), move |cx| {
            mutex.lock(cx).expect("demo lock");
            condvar.wait(cx, &mutex).expect("demo wait");
            info!(actor = cx.name(), time = %cx.now(), "woken");
            mutex.unlock(cx).expect("demo unlock");
        })?;

        kernel.spawn(&format!("notifier-{pair}"), move |cx| {
            sleep_for(cx, delay).expect("demo sleep");
            mutex.lock(cx).expect("demo lock");
            condvar.notify_one(cx).expect("demo notify");
            mutex.unlock(cx).expect("demo unlock");
        })?;
    }

    kernel.run()?;
    metrics.record_stats(kernel.stats());

    EventLogger::log_event(
        "demo_finished",
        vec![KeyValue::new("final_time", kernel.now().as_secs())],
    );
    let stats = kernel.stats();
    println!("final time:       {}", kernel.now());
    println!("rounds:           {}", stats.rounds);
    println!("simcalls:         {}", stats.simcalls_total());
    println!("context resumes:  {}", stats.context_resumes);
    println!("timers fired:     {}", stats.timers_fired);
    Ok(())
}
