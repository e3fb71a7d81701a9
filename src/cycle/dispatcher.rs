//! Fire-and-forget cycle supervisor.

use super::{run_cycle, CycleContext, CycleError};
use crate::events::{Events, ServiceEvent};
use actix::{Arbiter, ArbiterHandle};
use failure::Fallible;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What to do when a cycle is due while another one is still running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum OverlapPolicy {
    /// Do not start a new cycle; wait for the next due time.
    Skip,
    /// Start the new cycle anyway, running both concurrently.
    Allow,
}

impl OverlapPolicy {
    pub(crate) fn try_from_config(input: &str) -> Fallible<Self> {
        let policy = match input {
            "skip" | "" => OverlapPolicy::Skip,
            "allow" => OverlapPolicy::Allow,
            x => bail!("unsupported overlap policy '{}'", x),
        };
        Ok(policy)
    }
}

/// Starts cycles off the control loop, behind a fault boundary.
///
/// Cycles run on a separate arbiter and are never awaited nor
/// cancelled by the dispatcher; their outcome is only reported as
/// events.
#[derive(Clone, Debug)]
pub(crate) struct Dispatcher {
    ctx: CycleContext,
    overlap: OverlapPolicy,
    in_flight: Arc<AtomicUsize>,
    events: Events,
    arbiter: ArbiterHandle,
}

/// Keeps the in-flight counter up to date, whatever happens to the cycle.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Dispatcher {
    pub(crate) fn new(
        ctx: CycleContext,
        overlap: OverlapPolicy,
        events: Events,
        arbiter: ArbiterHandle,
    ) -> Self {
        Self {
            ctx,
            overlap,
            in_flight: Arc::new(AtomicUsize::new(0)),
            events,
            arbiter,
        }
    }

    /// Number of cycles currently running.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Start a new cycle, unless the overlap policy forbids it.
    ///
    /// Returns whether a cycle was started. Never blocks.
    pub(crate) fn dispatch(&self) -> bool {
        let running = self.in_flight();
        if running > 0 && self.overlap == OverlapPolicy::Skip {
            self.events
                .emit(ServiceEvent::CycleSkipped { in_flight: running });
            return false;
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(Arc::clone(&self.in_flight));
        self.events.emit(ServiceEvent::CycleStarted);

        let supervised = supervise(self.ctx.clone(), self.events.clone(), guard);
        if !self.arbiter.spawn(supervised) {
            let err = CycleError::Panic(String::from("cycle arbiter is gone"));
            self.events.emit(ServiceEvent::CycleFailed(err));
            return false;
        }
        true
    }

    /// Stop the cycle arbiter once all in-flight cycles are done.
    ///
    /// Does not block; cycles dispatched afterwards may be rejected.
    pub(crate) fn retire(&self) {
        let in_flight = Arc::clone(&self.in_flight);
        let drain = async move {
            while in_flight.load(Ordering::SeqCst) > 0 {
                actix::clock::sleep(DRAIN_POLL).await;
            }
            trace!("cycle arbiter drained, stopping");
            Arbiter::current().stop();
        };
        if !self.arbiter.spawn(drain) {
            debug!("cycle arbiter already stopped");
        }
    }
}

/// Poll period while waiting for in-flight cycles before shutdown.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Run a cycle, turning every error or panic into a reported event.
async fn supervise(ctx: CycleContext, events: Events, _guard: InFlight) {
    let outcome = AssertUnwindSafe(run_cycle(ctx)).catch_unwind().await;
    let event = match outcome {
        Ok(Ok(updates)) => ServiceEvent::CyclePublished { updates },
        Ok(Err(err)) => ServiceEvent::CycleFailed(err),
        Err(payload) => ServiceEvent::CycleFailed(CycleError::from_panic(&*payload)),
    };
    events.emit(event);
}
