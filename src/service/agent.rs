//! Service agent state-machine.

use super::{Cadences, ControlRequest, LifecycleState, ServiceHost, ServiceStatus};
use crate::cycle::Dispatcher;
use crate::events::{Events, ServiceEvent};
use crate::scheduler::Scheduler;
use actix::prelude::*;
use futures::channel::oneshot;
use futures::stream::BoxStream;
use std::time::{Duration, Instant};

/// Delay between the two status reports answering an interrogation.
const INTERROGATE_DELAY: Duration = Duration::from_millis(100);

/// Main service actor.
///
/// Ticks and control requests are both handled by this actor, one at a
/// time and to completion. Cycles are handed to the dispatcher and never
/// awaited here.
pub(crate) struct ServiceAgent {
    host: Box<dyn ServiceHost>,
    requests: Option<BoxStream<'static, ControlRequest>>,
    state: LifecycleState,
    cadences: Cadences,
    ticker: Option<SpawnHandle>,
    scheduler: Scheduler,
    dispatcher: Dispatcher,
    events: Events,
    done: Option<oneshot::Sender<()>>,
}

impl ServiceAgent {
    pub(crate) fn new(
        host: Box<dyn ServiceHost>,
        requests: BoxStream<'static, ControlRequest>,
        cadences: Cadences,
        scheduler: Scheduler,
        dispatcher: Dispatcher,
        events: Events,
        done: oneshot::Sender<()>,
    ) -> Self {
        Self {
            host,
            requests: Some(requests),
            state: LifecycleState::StartPending,
            cadences,
            ticker: None,
            scheduler,
            dispatcher,
            events,
            done: Some(done),
        }
    }

    /// Move to `state` and report it.
    fn transition(&mut self, state: LifecycleState) {
        self.state = state;
        self.report(ServiceStatus::new(state));
    }

    fn report(&self, status: ServiceStatus) {
        self.host.report_state(&status);
        self.events.emit(ServiceEvent::StateReported(status));
    }

    /// Replace the current tick source with one at `cadence`.
    fn set_cadence(&mut self, cadence: Duration, ctx: &mut Context<Self>) {
        if let Some(handle) = self.ticker.take() {
            ctx.cancel_future(handle);
        }
        trace!("tick cadence set to {:?}", cadence);
        let handle = ctx.run_interval(cadence, |act, _ctx| act.tick(Instant::now()));
        self.ticker = Some(handle);
    }

    fn tick(&mut self, now: Instant) {
        if !self.scheduler.on_tick(now) {
            return;
        }

        trace!(
            "cycle due, next one not before {:?}",
            self.scheduler.cursor() - now
        );
        self.dispatcher.dispatch();
    }

    /// Report the current status twice, holding other events meanwhile.
    fn interrogate(&mut self, ctx: &mut Context<Self>) {
        let status = ServiceStatus::new(self.state);
        self.report(status);

        let second = actix::clock::sleep(INTERROGATE_DELAY)
            .into_actor(self)
            .map(move |_, act, _ctx| act.report(status));
        ctx.wait(second);
    }

    fn begin_stop(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.ticker.take() {
            ctx.cancel_future(handle);
        }
        self.transition(LifecycleState::StopPending);
        ctx.stop();
    }
}

impl Actor for ServiceAgent {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        trace!("service agent started");
        self.report(ServiceStatus::new(LifecycleState::StartPending));

        if let Some(requests) = self.requests.take() {
            ctx.add_stream(requests);
        }
        self.transition(LifecycleState::Running);
        self.set_cadence(self.cadences.active, ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.transition(LifecycleState::Stopped);
        if self.dispatcher.in_flight() > 0 {
            debug!(
                "service stopped with {} cycle(s) still running",
                self.dispatcher.in_flight()
            );
        }
        self.dispatcher.retire();
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl StreamHandler<ControlRequest> for ServiceAgent {
    fn handle(&mut self, req: ControlRequest, ctx: &mut Self::Context) {
        trace!("control request {:?}, current state: {}", req, self.state);

        match (self.state, req) {
            (LifecycleState::Running, ControlRequest::Pause) => {
                self.transition(LifecycleState::Paused);
                self.set_cadence(self.cadences.idle, ctx);
            }
            (LifecycleState::Paused, ControlRequest::Continue) => {
                self.transition(LifecycleState::Running);
                self.set_cadence(self.cadences.active, ctx);
            }
            (LifecycleState::Running, ControlRequest::Stop)
            | (LifecycleState::Running, ControlRequest::Shutdown)
            | (LifecycleState::Paused, ControlRequest::Stop)
            | (LifecycleState::Paused, ControlRequest::Shutdown) => self.begin_stop(ctx),
            (LifecycleState::Running, ControlRequest::Interrogate)
            | (LifecycleState::Paused, ControlRequest::Interrogate) => self.interrogate(ctx),
            (_, other) => self.events.emit(ServiceEvent::UnexpectedRequest(other)),
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        info!("control channel closed");
        match self.state {
            LifecycleState::Running | LifecycleState::Paused => self.begin_stop(ctx),
            _ => {}
        }
    }
}
