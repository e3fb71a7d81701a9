//! Console service host.
//!
//! Control requests come from process signals and, in interactive
//! mode, from commands typed on stdin.

use super::{Cadences, ControlRequest, ServiceHost, ServiceStatus};
use failure::Fallible;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::stream::{BoxStream, StreamExt};
use std::io::BufRead;

/// Service host for foreground and signal-driven runs.
#[derive(Debug)]
pub(crate) struct ConsoleHost {
    cadences: Cadences,
    interactive: bool,
}

impl ConsoleHost {
    pub(crate) fn new(cadences: Cadences, interactive: bool) -> Self {
        Self {
            cadences,
            interactive,
        }
    }
}

impl ServiceHost for ConsoleHost {
    fn report_state(&self, status: &ServiceStatus) {
        debug!(
            "status change: {} (accepts stop: {}, shutdown: {}, pause/continue: {})",
            status.state,
            status.accepts.stop,
            status.accepts.shutdown,
            status.accepts.pause_continue
        );
    }

    fn control_requests(&mut self) -> Fallible<BoxStream<'static, ControlRequest>> {
        let (tx, rx) = mpsc::unbounded();
        watch_signals(&tx)?;
        if self.interactive {
            read_commands(tx);
        }
        Ok(rx.boxed())
    }

    fn cadences(&self) -> Cadences {
        self.cadences
    }
}

/// Forward termination and control signals as control requests.
#[cfg(unix)]
fn watch_signals(tx: &UnboundedSender<ControlRequest>) -> Fallible<()> {
    use failure::ResultExt;
    use tokio::signal::unix::{signal, SignalKind};

    let table = vec![
        (SignalKind::terminate(), ControlRequest::Stop),
        (SignalKind::interrupt(), ControlRequest::Shutdown),
        (SignalKind::user_defined1(), ControlRequest::Pause),
        (SignalKind::user_defined2(), ControlRequest::Continue),
        (SignalKind::hangup(), ControlRequest::Interrogate),
    ];

    for (kind, req) in table {
        let mut sig = signal(kind).context("failed to install signal handler")?;
        let tx = tx.clone();
        actix::spawn(async move {
            while sig.recv().await.is_some() {
                trace!("got signal for {:?}", req);
                if tx.unbounded_send(req).is_err() {
                    break;
                }
            }
        });
    }

    Ok(())
}

/// Forward Ctrl-C as a shutdown request.
#[cfg(not(unix))]
fn watch_signals(tx: &UnboundedSender<ControlRequest>) -> Fallible<()> {
    let tx = tx.clone();
    actix::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.unbounded_send(ControlRequest::Shutdown).is_err() {
                break;
            }
        }
    });
    Ok(())
}

/// Read control commands from stdin, on a dedicated thread.
fn read_commands(tx: UnboundedSender<ControlRequest>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("failed to read stdin: {}", e);
                    break;
                }
            };
            let req = match parse_command(&line) {
                Some(r) => r,
                None => {
                    if !line.trim().is_empty() {
                        warn!("unknown command '{}'", line.trim());
                    }
                    continue;
                }
            };
            if tx.unbounded_send(req).is_err() {
                break;
            }
        }
        trace!("stdin reader done");
    });
}

/// Parse a command name or a numeric control code.
fn parse_command(input: &str) -> Option<ControlRequest> {
    let cmd = input.trim().to_lowercase();
    let req = match cmd.as_str() {
        "stop" => ControlRequest::Stop,
        "shutdown" => ControlRequest::Shutdown,
        "pause" => ControlRequest::Pause,
        "continue" => ControlRequest::Continue,
        "interrogate" | "status" => ControlRequest::Interrogate,
        other => ControlRequest::from_code(other.parse().ok()?),
    };
    Some(req)
}
