//! AMQP publisher, one connection per report.

use super::Publisher;
use crate::config::BrokerConfig;
use failure::{Fallible, ResultExt};
use futures::future::{BoxFuture, FutureExt};
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::AMQPUri;
use lapin::{BasicProperties, Connection, ConnectionProperties};

/// Publisher backed by a RabbitMQ broker.
#[derive(Clone, Debug, Default)]
pub(crate) struct AmqpPublisher {}

impl Publisher for AmqpPublisher {
    fn publish(
        &self,
        payload: Vec<u8>,
        destination: &BrokerConfig,
    ) -> BoxFuture<'static, Fallible<()>> {
        send_report(payload, destination.clone()).boxed()
    }
}

async fn send_report(payload: Vec<u8>, broker: BrokerConfig) -> Fallible<()> {
    trace!(
        "connecting to broker at {}:{}, vhost '{}'",
        broker.host,
        broker.port,
        broker.vhost
    );
    let uri: AMQPUri = broker
        .amqp_uri()?
        .as_str()
        .parse()
        .map_err(|e: String| format_err!("invalid broker URI: {}", e))?;
    let conn = Connection::connect_uri(uri, ConnectionProperties::default())
        .await
        .context(format!(
            "failed to connect to broker {}:{}",
            broker.host, broker.port
        ))?;

    let published = publish_on(&conn, &payload, &broker).await;
    if let Err(e) = conn.close(200, "OK").await {
        debug!("failed to close broker connection: {}", e);
    }
    published
}

async fn publish_on(conn: &Connection, payload: &[u8], broker: &BrokerConfig) -> Fallible<()> {
    let channel = conn
        .create_channel()
        .await
        .context("failed to open a channel")?;

    let queue = channel
        .queue_declare(
            &broker.queue,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context(format!("failed to declare queue '{}'", broker.queue))?;

    let confirm = channel
        .basic_publish(
            &broker.exchange,
            queue.name().as_str(),
            BasicPublishOptions::default(),
            payload,
            BasicProperties::default().with_content_type("text/plain".into()),
        )
        .await
        .context(format!("failed to publish to exchange '{}'", broker.exchange))?;
    confirm.await.context("failed to confirm publication")?;

    debug!(
        "published {} bytes to exchange '{}', routing key '{}'",
        payload.len(),
        broker.exchange,
        broker.queue
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix::test]
    async fn unreachable_broker_is_an_error() {
        let broker = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            vhost: String::new(),
            queue: "kb".to_string(),
            exchange: "win_kb_info".to_string(),
            user: "guest".to_string(),
            pass: "guest".to_string(),
        };

        let res = AmqpPublisher::default()
            .publish(b"{}".to_vec(), &broker)
            .await;
        assert!(res.is_err());
    }
}
