//! Message delivery to the broker.

mod amqp;

pub(crate) use amqp::AmqpPublisher;

use crate::config::BrokerConfig;
use failure::Fallible;
use futures::future::BoxFuture;
use std::fmt::Debug;

/// Sink for serialized update reports.
pub(crate) trait Publisher: Debug + Send + Sync + 'static {
    /// Deliver `payload` to the queue described by `destination`,
    /// declaring the queue first if needed.
    fn publish(
        &self,
        payload: Vec<u8>,
        destination: &BrokerConfig,
    ) -> BoxFuture<'static, Fallible<()>>;
}
