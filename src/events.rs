//! Service events.
//!
//! Lifecycle transitions and cycle outcomes are reported through an
//! `EventSink`, injected into every component at construction.

use crate::cycle::CycleError;
use crate::service::{ControlRequest, ServiceStatus};
use std::fmt::Debug;
use std::sync::Arc;

/// Notable service events.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ServiceEvent {
    /// A lifecycle status was reported to the service host.
    StateReported(ServiceStatus),
    /// A control request with no transition from the current state.
    UnexpectedRequest(ControlRequest),
    /// A cycle was triggered and dispatched.
    CycleStarted,
    /// A cycle was due but a previous one is still in flight.
    CycleSkipped { in_flight: usize },
    /// A cycle published its message.
    CyclePublished { updates: usize },
    /// A cycle failed and was recovered.
    CycleFailed(CycleError),
}

/// Receiver for service events.
pub(crate) trait EventSink: Debug + Send + Sync {
    fn emit(&self, event: ServiceEvent);
}

/// Shared handle to an event sink.
pub(crate) type Events = Arc<dyn EventSink>;

/// Event sink forwarding to the process logger.
#[derive(Debug, Default)]
pub(crate) struct LogSink {}

impl EventSink for LogSink {
    fn emit(&self, event: ServiceEvent) {
        match event {
            ServiceEvent::StateReported(status) => info!("service state: {}", status.state),
            ServiceEvent::UnexpectedRequest(req) => error!("unexpected control request {:?}", req),
            ServiceEvent::CycleStarted => info!("starting update cycle"),
            ServiceEvent::CycleSkipped { in_flight } => warn!(
                "update cycle skipped, {} previous cycle(s) still running",
                in_flight
            ),
            ServiceEvent::CyclePublished { updates } => {
                info!("update cycle done, published {} pending update(s)", updates)
            }
            ServiceEvent::CycleFailed(err) => error!("update cycle failed: {}", err),
        }
    }
}

/// Event sink recording everything, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct CaptureSink {
    events: std::sync::Mutex<Vec<ServiceEvent>>,
}

#[cfg(test)]
impl CaptureSink {
    pub(crate) fn events(&self) -> Vec<ServiceEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Lifecycle states reported so far, in order.
    pub(crate) fn states(&self) -> Vec<crate::service::LifecycleState> {
        self.events()
            .into_iter()
            .filter_map(|ev| match ev {
                ServiceEvent::StateReported(s) => Some(s.state),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl EventSink for CaptureSink {
    fn emit(&self, event: ServiceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_sink_keeps_order() {
        let sink = CaptureSink::default();
        sink.emit(ServiceEvent::CycleStarted);
        sink.emit(ServiceEvent::CyclePublished { updates: 2 });

        assert_eq!(
            sink.events(),
            vec![
                ServiceEvent::CycleStarted,
                ServiceEvent::CyclePublished { updates: 2 }
            ]
        );
        assert!(sink.states().is_empty());
    }
}
