//! wgsa-agent: pending updates reporting agent.
//!
//! This binary runs as a long-lived service on a host, periodically
//! collecting the list of updates not yet installed and publishing it
//! to a message broker.
//!
//! It is made of a single service actor and a cycle dispatcher:
//!  * `ServiceAgent` - lifecycle state-machine, consuming control requests and ticks.
//!  * `Dispatcher` - runs each collect-and-publish cycle off the control loop,
//!    behind a fault boundary.

extern crate env_logger;
#[macro_use]
extern crate failure;
extern crate futures;
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate structopt;

mod collector;
mod config;
mod cycle;
mod events;
mod publisher;
mod scheduler;
mod service;

use crate::collector::{Collector, PowershellCollector, PENDING_QUERY};
use crate::config::AgentConfig;
use crate::cycle::UpdateReport;
use crate::events::LogSink;
use crate::publisher::AmqpPublisher;
use crate::service::ConsoleHost;
use failure::{Fallible, ResultExt};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use structopt::StructOpt;

/// Service name.
static SERVICE_NAME: &str = "wgsa-agent";

#[derive(Debug, StructOpt)]
#[structopt(name = "wgsa-agent", about = "Pending updates reporting agent.")]
struct CliOptions {
    /// Verbosity level (repeat for more).
    #[structopt(short = "v", parse(from_occurrences))]
    verbosity: u8,

    #[structopt(subcommand)]
    cmd: CliCommand,
}

#[derive(Debug, StructOpt)]
enum CliCommand {
    /// Run the service, controlled through signals.
    #[structopt(name = "run")]
    Run {
        /// Path to configuration file.
        #[structopt(parse(from_os_str))]
        config: PathBuf,
    },
    /// Run the service in foreground, reading control commands from stdin.
    #[structopt(name = "debug")]
    Debug {
        /// Path to configuration file.
        #[structopt(parse(from_os_str))]
        config: PathBuf,
    },
    /// Collect pending updates once and print the resulting report.
    #[structopt(name = "collect")]
    Collect,
    /// Validate configuration and print it.
    #[structopt(name = "check-config")]
    CheckConfig {
        /// Path to configuration file.
        #[structopt(parse(from_os_str))]
        config: PathBuf,
    },
}

fn main() {
    let opts = CliOptions::from_args();

    if let Err(e) = init_logging(opts.verbosity) {
        eprintln!("failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(opts.cmd) {
        error!("failed to run {}: {}", SERVICE_NAME, e);
        for cause in e.iter_causes() {
            error!(" caused by: {}", cause);
        }
        std::process::exit(1);
    }
}

fn init_logging(verbosity: u8) -> Fallible<()> {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init()?;
    Ok(())
}

fn run(cmd: CliCommand) -> Fallible<()> {
    match cmd {
        CliCommand::Run { config } => serve(&config, false),
        CliCommand::Debug { config } => serve(&config, true),
        CliCommand::Collect => collect(),
        CliCommand::CheckConfig { config } => check_config(&config),
    }
}

/// Run the service agent until stopped.
fn serve(config_path: &Path, interactive: bool) -> Fallible<()> {
    let cfg = AgentConfig::read_config(config_path).context(format!(
        "failed to load configuration from '{}'",
        config_path.display()
    ))?;
    let cfg = Arc::new(cfg);
    info!("starting {} service", SERVICE_NAME);

    let sys = actix::System::new();
    sys.block_on(async move {
        let host = ConsoleHost::new(cfg.cadences, interactive);
        service::run_service(
            Box::new(host),
            cfg,
            Arc::new(PowershellCollector::default()),
            Arc::new(AmqpPublisher::default()),
            Arc::new(LogSink::default()),
        )
        .await
    })?;

    info!("{} service stopped", SERVICE_NAME);
    Ok(())
}

/// Collect once and print the report that would be published.
fn collect() -> Fallible<()> {
    let records = PowershellCollector::default().collect(PENDING_QUERY)?;
    let hostname = cycle::resolve_hostname(None)?;
    let report = UpdateReport::new(&hostname, cycle::unix_now(), records);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check_config(config_path: &Path) -> Fallible<()> {
    let cfg = AgentConfig::read_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}
