/// Configuration parsing and validation.
///
/// This module contains three logical entities:
///  * Snippets: single configuration files, holding a subset of configuration entries.
///  * Inputs: configuration snippets merged, but not yet validated.
///  * AgentConfig: validated configuration for the service agent.
mod inputs;
mod snippets;

use crate::cycle::OverlapPolicy;
use crate::service::Cadences;
use failure::{Fallible, ResultExt};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default AMQP port.
static DEFAULT_PORT: u16 = 5672;

/// Default exchange for update reports.
static DEFAULT_EXCHANGE: &str = "win_kb_info";

/// Upper bound for `Main.TimePeriod`, in minutes (one leap year).
static MAX_TIME_PERIOD: i64 = 366 * 24 * 60;

/// Default tick cadence while running, in milliseconds.
static DEFAULT_ACTIVE_TICK_MS: u64 = 500;

/// Default tick cadence while paused, in milliseconds.
static DEFAULT_IDLE_TICK_MS: u64 = 2000;

/// Runtime configuration for the agent.
///
/// It holds validated agent configuration, loaded once and never
/// mutated afterwards.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct AgentConfig {
    /// Time between two scheduled cycles.
    pub(crate) interval: Duration,
    /// Hostname override for outbound messages.
    pub(crate) hostname: Option<String>,
    pub(crate) overlap: OverlapPolicy,
    pub(crate) cadences: Cadences,
    pub(crate) broker: BrokerConfig,
}

/// Broker connection parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct BrokerConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) vhost: String,
    pub(crate) queue: String,
    pub(crate) exchange: String,
    pub(crate) user: String,
    #[serde(skip_serializing)]
    pub(crate) pass: String,
}

impl BrokerConfig {
    /// Connection URI for this broker, with credentials embedded.
    pub(crate) fn amqp_uri(&self) -> Fallible<Url> {
        let mut uri = Url::parse("amqp://localhost/")?;

        let host_set = match self.host.parse::<IpAddr>() {
            Ok(ip) => uri.set_ip_host(ip).is_ok(),
            Err(_) => uri.set_host(Some(&self.host)).is_ok(),
        };
        if !host_set {
            bail!("invalid broker host '{}'", self.host);
        }
        uri.set_port(Some(self.port))
            .map_err(|_| format_err!("invalid broker port {}", self.port))?;
        uri.set_username(&self.user)
            .map_err(|_| format_err!("invalid broker user '{}'", self.user))?;
        uri.set_password(Some(&self.pass))
            .map_err(|_| format_err!("invalid broker password"))?;
        uri.path_segments_mut()
            .map_err(|_| format_err!("broker URI cannot carry a vhost"))?
            .clear()
            .push(&self.vhost);

        Ok(uri)
    }
}

impl AgentConfig {
    /// Read and validate the configuration at `path` (plus drop-ins).
    pub(crate) fn read_config(path: &Path) -> Fallible<Self> {
        let cfg = inputs::ConfigInput::read_config(path)?;
        Self::try_from_input(cfg)
    }

    /// Validate inputs and return a valid agent configuration.
    fn try_from_input(cfg: inputs::ConfigInput) -> Fallible<Self> {
        if cfg.main.time_period <= 0 || cfg.main.time_period > MAX_TIME_PERIOD {
            bail!(
                "invalid Main.TimePeriod '{}', must be between 1 and {} minutes",
                cfg.main.time_period,
                MAX_TIME_PERIOD
            );
        }
        let interval = Duration::from_secs(cfg.main.time_period as u64 * 60);

        let hostname = if cfg.main.hostname.is_empty() {
            None
        } else {
            Some(cfg.main.hostname)
        };

        let overlap = OverlapPolicy::try_from_config(&cfg.main.overlap)
            .context("invalid Main.Overlap")?;

        let active = if cfg.main.active_tick_ms == 0 {
            DEFAULT_ACTIVE_TICK_MS
        } else {
            cfg.main.active_tick_ms
        };
        let idle = if cfg.main.idle_tick_ms == 0 {
            DEFAULT_IDLE_TICK_MS
        } else {
            cfg.main.idle_tick_ms
        };
        let cadences = Cadences {
            active: Duration::from_millis(active),
            idle: Duration::from_millis(idle),
        };

        let broker = BrokerConfig::try_from_input(cfg.broker)?;

        let agent_cfg = AgentConfig {
            interval,
            hostname,
            overlap,
            cadences,
            broker,
        };
        debug!(
            "runtime configuration:\n{}",
            serde_json::to_string_pretty(&agent_cfg).context("failed to render configuration")?
        );

        Ok(agent_cfg)
    }
}

impl BrokerConfig {
    fn try_from_input(cfg: inputs::BrokerInput) -> Fallible<Self> {
        if cfg.host.is_empty() {
            bail!("missing RabbitMQ.Host");
        }
        if cfg.queue.is_empty() {
            bail!("missing RabbitMQ.Queue");
        }

        let port = match cfg.port {
            0 => DEFAULT_PORT,
            p if p > 0 && p <= i64::from(u16::max_value()) => p as u16,
            p => bail!("invalid RabbitMQ.Port '{}'", p),
        };

        let exchange = if cfg.exchange.is_empty() {
            String::from(DEFAULT_EXCHANGE)
        } else {
            cfg.exchange
        };

        let broker = Self {
            host: cfg.host,
            port,
            vhost: cfg.vhost,
            queue: cfg.queue,
            exchange,
            user: cfg.user,
            pass: cfg.pass,
        };
        broker
            .amqp_uri()
            .context("invalid RabbitMQ connection parameters")?;

        Ok(broker)
    }
}
