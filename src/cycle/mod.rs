//! Update cycle: collect, build report, publish.
//!
//! A cycle is a self-contained unit of work. All of its failures end up
//! as a `CycleError` value, which the dispatcher reports and drops.

mod dispatcher;
mod message;

pub(crate) use dispatcher::{Dispatcher, OverlapPolicy};
pub(crate) use message::{resolve_hostname, unix_now, UpdateReport};

use crate::collector::{Collector, PENDING_QUERY};
use crate::config::AgentConfig;
use crate::publisher::Publisher;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Steps of a cycle, for error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CycleStep {
    Collect,
    Build,
    Serialize,
    Publish,
}

impl fmt::Display for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CycleStep::Collect => "collect",
            CycleStep::Build => "build",
            CycleStep::Serialize => "serialize",
            CycleStep::Publish => "publish",
        };
        write!(f, "{}", name)
    }
}

/// Recovered cycle failure.
#[derive(Clone, Debug, Fail, PartialEq)]
pub(crate) enum CycleError {
    #[fail(display = "{} step failed: {}", step, cause)]
    Step { step: CycleStep, cause: String },
    #[fail(display = "cycle panicked: {}", _0)]
    Panic(String),
}

impl CycleError {
    fn at(step: CycleStep, err: failure::Error) -> Self {
        let cause = err
            .iter_chain()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(": ");
        CycleError::Step { step, cause }
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::from("unknown panic payload")
        };
        CycleError::Panic(msg)
    }
}

/// Everything a cycle needs, shared read-only with the control loop.
#[derive(Clone, Debug)]
pub(crate) struct CycleContext {
    pub(crate) config: Arc<AgentConfig>,
    pub(crate) collector: Arc<dyn Collector>,
    pub(crate) publisher: Arc<dyn Publisher>,
}

/// Run one cycle, returning the number of published updates.
///
/// Nothing is published unless the report was fully built and serialized.
pub(crate) async fn run_cycle(ctx: CycleContext) -> Result<usize, CycleError> {
    let collector = Arc::clone(&ctx.collector);
    let records = tokio::task::spawn_blocking(move || collector.collect(PENDING_QUERY))
        .await
        .map_err(|e| match e.try_into_panic() {
            Ok(payload) => CycleError::from_panic(&*payload),
            Err(e) => CycleError::at(CycleStep::Collect, e.into()),
        })?
        .map_err(|e| CycleError::at(CycleStep::Collect, e))?;
    debug!("collected {} pending update(s)", records.len());

    let hostname = resolve_hostname(ctx.config.hostname.as_deref())
        .map_err(|e| CycleError::at(CycleStep::Build, e))?;
    let report = UpdateReport::new(&hostname, unix_now(), records);
    let payload = report
        .to_payload()
        .map_err(|e| CycleError::at(CycleStep::Serialize, e))?;

    ctx.publisher
        .publish(payload, &ctx.config.broker)
        .await
        .map_err(|e| CycleError::at(CycleStep::Publish, e))?;

    Ok(report.updates.len())
}

#[cfg(test)]
pub(crate) mod testutils {
    use super::*;
    use crate::collector::UpdateRecord;
    use crate::config::BrokerConfig;
    use crate::service::Cadences;
    use failure::Fallible;
    use futures::future::{self, BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    pub(crate) fn test_config(interval: Duration) -> AgentConfig {
        AgentConfig {
            interval,
            hostname: Some("TEST-HOST".to_string()),
            overlap: OverlapPolicy::Allow,
            cadences: Cadences {
                active: Duration::from_millis(10),
                idle: Duration::from_millis(40),
            },
            broker: BrokerConfig {
                host: "localhost".to_string(),
                port: 5672,
                vhost: String::new(),
                queue: "kb".to_string(),
                exchange: "win_kb_info".to_string(),
                user: "guest".to_string(),
                pass: "guest".to_string(),
            },
        }
    }

    /// Collector returning a fixed list, failing, or panicking.
    #[derive(Debug)]
    pub(crate) enum StubCollector {
        Fixed(Vec<UpdateRecord>),
        Failing,
        Panicking,
        Slow(Duration),
    }

    impl Collector for StubCollector {
        fn collect(&self, query: &str) -> Fallible<Vec<UpdateRecord>> {
            assert_eq!(query, PENDING_QUERY);
            match self {
                StubCollector::Fixed(records) => Ok(records.clone()),
                StubCollector::Failing => bail!("search service unavailable"),
                StubCollector::Panicking => panic!("collector blew up"),
                StubCollector::Slow(delay) => {
                    std::thread::sleep(*delay);
                    Ok(vec![])
                }
            }
        }
    }

    /// Publisher recording payloads, optionally failing or panicking.
    #[derive(Debug, Default)]
    pub(crate) struct StubPublisher {
        pub(crate) payloads: Mutex<Vec<Vec<u8>>>,
        pub(crate) attempts: AtomicUsize,
        pub(crate) fail: bool,
        pub(crate) panic: bool,
    }

    impl StubPublisher {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub(crate) fn panicking() -> Self {
            Self {
                panic: true,
                ..Default::default()
            }
        }

        pub(crate) fn payloads(&self) -> Vec<serde_json::Value> {
            self.payloads
                .lock()
                .unwrap()
                .iter()
                .map(|p| serde_json::from_slice(p).unwrap())
                .collect()
        }

        pub(crate) fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl Publisher for StubPublisher {
        fn publish(
            &self,
            payload: Vec<u8>,
            destination: &BrokerConfig,
        ) -> BoxFuture<'static, Fallible<()>> {
            assert_eq!(destination.queue, "kb");
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("publisher blew up");
            }
            if self.fail {
                return future::err(format_err!("connection refused")).boxed();
            }
            self.payloads.lock().unwrap().push(payload);
            future::ok(()).boxed()
        }
    }

    pub(crate) fn context(
        collector: StubCollector,
        publisher: Arc<StubPublisher>,
        config: AgentConfig,
    ) -> CycleContext {
        CycleContext {
            config: Arc::new(config),
            collector: Arc::new(collector),
            publisher,
        }
    }
}
