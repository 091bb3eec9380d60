//! hostpulse - live monitor for machines reporting to a monitoring service.
//!
//! Polls the service's REST API and prints live tiles: per-machine resource
//! usage with derived network and disk rates (`watch`), or the fleet overview
//! with unresolved alerts (`fleet`).

mod http;
mod tiles;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use hostpulse_core::engine::{EngineConfig, EntityView, SnapshotOrder};
use hostpulse_core::model::EntityId;
use hostpulse_core::monitor::{EntityMonitor, FleetMonitor};
use hostpulse_core::scheduler::{PollConfig, PollScheduler, SchedulerHandle};

use crate::http::{DEFAULT_API_URL, HttpSource};

/// Live monitor for machines reporting to a monitoring service.
#[derive(Parser)]
#[command(name = "hostpulse", about = "Live machine telemetry monitor", version)]
struct Args {
    /// Base URL of the monitoring API.
    #[arg(long, default_value = DEFAULT_API_URL, env = "HOSTPULSE_API_URL")]
    api_url: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value = "30", env = "HOSTPULSE_TIMEOUT")]
    timeout: u64,

    /// Poll interval in milliseconds. Defaults to 1000 for `watch`, 3000 for `fleet`.
    #[arg(long, env = "HOSTPULSE_INTERVAL_MS")]
    interval_ms: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow one or more machines.
    Watch {
        /// Machine ids.
        #[arg(required = true)]
        ids: Vec<EntityId>,

        /// Snapshots kept per machine.
        #[arg(long, default_value = "100", env = "HOSTPULSE_WINDOW")]
        window: usize,

        /// Snapshots requested per poll.
        #[arg(long, default_value = "100", env = "HOSTPULSE_SNAPSHOT_LIMIT")]
        limit: usize,

        /// The API returns snapshots oldest first.
        #[arg(long)]
        ascending: bool,
    },
    /// Show the fleet overview.
    Fleet,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["hostpulse", "hostpulse_core"] {
        if let Ok(directive) = format!("{target}={level}").parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let source = match HttpSource::new(&args.api_url, Duration::from_secs(args.timeout)) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "failed to create HTTP client");
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    info!(
        "hostpulse {} polling {}",
        hostpulse_core::VERSION,
        source.base_url()
    );
    let interval = args.interval_ms.map(Duration::from_millis);
    runtime.block_on(run(args.command, source, interval));
}

async fn run(command: Command, source: Arc<HttpSource>, interval: Option<Duration>) {
    match command {
        Command::Watch {
            ids,
            window,
            limit,
            ascending,
        } => {
            let config = EngineConfig {
                window_capacity: window,
                snapshot_limit: limit,
                snapshot_order: if ascending {
                    SnapshotOrder::Ascending
                } else {
                    SnapshotOrder::Descending
                },
            };
            let poll = interval.map_or_else(PollConfig::detail, PollConfig::new);
            watch_entities(source, ids, config, poll).await;
        }
        Command::Fleet => {
            let poll = interval.map_or_else(PollConfig::overview, PollConfig::new);
            watch_fleet(source, poll).await;
        }
    }
}

async fn watch_entities(
    source: Arc<HttpSource>,
    ids: Vec<EntityId>,
    config: EngineConfig,
    poll: PollConfig,
) {
    let mut handles = Vec::with_capacity(ids.len());
    let mut tasks = Vec::with_capacity(ids.len());
    for id in ids {
        let monitor = EntityMonitor::new(source.clone(), id, config);
        let rx = monitor.subscribe();
        let scheduler = PollScheduler::new(format!("system-{id}"), poll);
        handles.push(scheduler.handle());
        tasks.push(tokio::spawn(scheduler.run(monitor)));
        tokio::spawn(print_entity(rx));
    }

    shutdown_on_ctrl_c(handles).await;
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "poll task failed");
        }
    }
}

async fn watch_fleet(source: Arc<HttpSource>, poll: PollConfig) {
    let monitor = FleetMonitor::new(source);
    let mut rx = monitor.subscribe();
    let scheduler = PollScheduler::new("fleet", poll);
    let handle = scheduler.handle();
    let task = tokio::spawn(scheduler.run(monitor));

    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let view = rx.borrow_and_update().clone();
            for line in tiles::fleet_lines(&view, Utc::now()) {
                println!("{line}");
            }
            println!();
        }
    });

    shutdown_on_ctrl_c(vec![handle]).await;
    if let Err(e) = task.await {
        warn!(error = %e, "poll task failed");
    }
}

async fn print_entity(mut rx: watch::Receiver<Option<Arc<EntityView>>>) {
    while rx.changed().await.is_ok() {
        let view = rx.borrow_and_update().clone();
        match view {
            Some(view) => println!("{}", tiles::entity_line(&view, Utc::now())),
            None => break,
        }
    }
}

async fn shutdown_on_ctrl_c(handles: Vec<SchedulerHandle>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, stopping");
    } else {
        info!("received shutdown signal");
    }
    for handle in &handles {
        handle.stop();
    }
}
