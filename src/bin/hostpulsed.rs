//! hostpulsed - host telemetry agent.
//!
//! Collects system metrics from /proc on a fixed interval and ships them to
//! the configured sink. Buffered snapshots are flushed on shutdown.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

#[cfg(target_os = "linux")]
use hostpulse::collector::RealFs;
#[cfg(not(target_os = "linux"))]
use hostpulse::collector::mock::MockFs;
use hostpulse::collector::Aggregator;
use hostpulse::config::AgentConfig;
use hostpulse::scheduler::{Scheduler, SystemClock};
use hostpulse::storage::{ConfiguredSink, DispatchBuffer};

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
    for target in ["hostpulsed", "hostpulse"] {
        if let Ok(directive) = format!("{}={}", target, level).parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = AgentConfig::parse();

    init_logging(args.verbose, args.quiet);

    info!("hostpulsed {} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = args.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }
    if args.api_enabled && args.db_enabled {
        warn!("Both API and database sinks are enabled; using the API sink");
    }

    let aggregator_config = args.aggregator_config();
    let scheduler_config = args.scheduler_config();
    info!(
        "Config: interval={:?}, batch_size={}, proc={}, disk={}, top_processes={}",
        scheduler_config.interval,
        args.batch_size,
        aggregator_config.proc_path,
        aggregator_config.disk_path,
        aggregator_config.top_processes
    );

    let sink_config = match args.sink_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid sink configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let sink = match ConfiguredSink::from_config(sink_config) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Failed to set up sink: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let buffer = DispatchBuffer::new(sink, args.batch_size);

    #[cfg(target_os = "linux")]
    let aggregator = Aggregator::new(RealFs::new(), aggregator_config);
    #[cfg(not(target_os = "linux"))]
    let aggregator = Aggregator::new(MockFs::typical_system(), aggregator_config);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut scheduler = Scheduler::new(aggregator, buffer, SystemClock, scheduler_config);
    let flushed = scheduler.run(&running);

    let stats = scheduler.buffer().stats();
    info!(
        ticks = scheduler.ticks(),
        delivered = stats.delivered,
        failed = stats.failed,
        "Shutdown complete"
    );

    if flushed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
