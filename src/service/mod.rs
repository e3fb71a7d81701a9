//! Service lifecycle.
//!
//! The service agent is a single actor consuming both control requests
//! from the service host and its own periodic ticks. Ticks go through
//! the scheduler, which may hand a new cycle over to the dispatcher.

mod agent;
mod host;

pub(crate) use agent::ServiceAgent;
pub(crate) use host::ConsoleHost;

use crate::collector::Collector;
use crate::config::AgentConfig;
use crate::cycle::{CycleContext, Dispatcher};
use crate::events::Events;
use crate::publisher::Publisher;
use crate::scheduler::Scheduler;
use actix::{Actor, Arbiter};
use failure::{Fallible, ResultExt};
use futures::channel::oneshot;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle state of the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LifecycleState {
    StartPending,
    Running,
    Paused,
    StopPending,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            LifecycleState::StartPending => "start-pending",
            LifecycleState::Running => "running",
            LifecycleState::Paused => "paused",
            LifecycleState::StopPending => "stop-pending",
            LifecycleState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Control requests accepted in a given state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Accepts {
    pub(crate) stop: bool,
    pub(crate) shutdown: bool,
    pub(crate) pause_continue: bool,
}

/// Status as reported to the service host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ServiceStatus {
    pub(crate) state: LifecycleState,
    pub(crate) accepts: Accepts,
}

impl ServiceStatus {
    pub(crate) fn new(state: LifecycleState) -> Self {
        let accepts = match state {
            LifecycleState::Running | LifecycleState::Paused => Accepts {
                stop: true,
                shutdown: true,
                pause_continue: true,
            },
            _ => Accepts::default(),
        };
        Self { state, accepts }
    }
}

/// Control request from the service host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ControlRequest {
    Stop,
    Shutdown,
    Pause,
    Continue,
    Interrogate,
    /// Any other control code.
    Other(u32),
}

impl ControlRequest {
    /// Map a service-manager control code.
    pub(crate) fn from_code(code: u32) -> Self {
        match code {
            1 => ControlRequest::Stop,
            2 => ControlRequest::Pause,
            3 => ControlRequest::Continue,
            4 => ControlRequest::Interrogate,
            5 => ControlRequest::Shutdown,
            n => ControlRequest::Other(n),
        }
    }
}

/// Tick cadences, while running and while paused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct Cadences {
    pub(crate) active: Duration,
    pub(crate) idle: Duration,
}

/// Bridge to the service manager running this process.
pub(crate) trait ServiceHost: Send + 'static {
    /// Publish the current status to the service manager.
    fn report_state(&self, status: &ServiceStatus);

    /// Open the source of control requests. Called once, at startup.
    fn control_requests(&mut self) -> Fallible<BoxStream<'static, ControlRequest>>;

    /// Tick cadences to use.
    fn cadences(&self) -> Cadences;
}

/// Run the service agent until it reaches the `Stopped` state.
///
/// Cycles still in flight at that point are not cancelled.
pub(crate) async fn run_service(
    mut host: Box<dyn ServiceHost>,
    config: Arc<AgentConfig>,
    collector: Arc<dyn Collector>,
    publisher: Arc<dyn Publisher>,
    events: Events,
) -> Fallible<()> {
    let requests = host
        .control_requests()
        .context("failed to open control channel")?;
    let cadences = host.cadences();

    let cycle_ctx = CycleContext {
        config: Arc::clone(&config),
        collector,
        publisher,
    };
    let cycles = Arbiter::new();
    let dispatcher = Dispatcher::new(cycle_ctx, config.overlap, events.clone(), cycles.handle());
    let scheduler = Scheduler::new(config.interval, Instant::now());

    let (done_tx, done_rx) = oneshot::channel();
    let agent = ServiceAgent::new(
        host, requests, cadences, scheduler, dispatcher, events, done_tx,
    );
    agent.start();

    done_rx
        .await
        .context("service agent terminated without reporting")?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_controls_by_state() {
        let running = ServiceStatus::new(LifecycleState::Running);
        assert!(running.accepts.stop && running.accepts.shutdown && running.accepts.pause_continue);
        assert_eq!(
            ServiceStatus::new(LifecycleState::Paused).accepts,
            running.accepts
        );

        for state in &[
            LifecycleState::StartPending,
            LifecycleState::StopPending,
            LifecycleState::Stopped,
        ] {
            assert_eq!(ServiceStatus::new(*state).accepts, Accepts::default());
        }
    }

    #[test]
    fn control_codes() {
        assert_eq!(ControlRequest::from_code(1), ControlRequest::Stop);
        assert_eq!(ControlRequest::from_code(2), ControlRequest::Pause);
        assert_eq!(ControlRequest::from_code(3), ControlRequest::Continue);
        assert_eq!(ControlRequest::from_code(4), ControlRequest::Interrogate);
        assert_eq!(ControlRequest::from_code(5), ControlRequest::Shutdown);
        assert_eq!(ControlRequest::from_code(200), ControlRequest::Other(200));
    }
}
