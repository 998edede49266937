//! NATS-backed transport for multi-process deployments.

use super::{Message, Subscription, Transport, TransportError};
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tracing::info;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PING_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct NatsTransport {
    client: Client,
}

impl NatsTransport {
    /// Connect to `url`, failing fast when the server is not reachable.
    pub async fn connect(url: &str, name: &str) -> Result<Self, TransportError> {
        info!("Connecting to NATS at {}", url);
        let client = ConnectOptions::new()
            .name(name)
            .ping_interval(PING_INTERVAL)
            .connection_timeout(CONNECT_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Connected to NATS at {}", url);
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let result = match reply {
            Some(reply) => {
                self.client
                    .publish_with_reply(subject.to_string(), reply.to_string(), payload)
                    .await
            }
            None => self.client.publish(subject.to_string(), payload).await,
        };
        result.map_err(|e| TransportError::Publish {
            subject: subject.to_string(),
            reason: e.to_string(),
        })
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| TransportError::Subscribe {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;

        Ok(into_subscription(subscriber))
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
    ) -> Result<Subscription, TransportError> {
        let subscriber = self
            .client
            .queue_subscribe(subject.to_string(), group.to_string())
            .await
            .map_err(|e| TransportError::Subscribe {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;
        Ok(into_subscription(subscriber))
    }

    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }
}

fn into_subscription(subscriber: async_nats::Subscriber) -> Subscription {
    subscriber
        .map(|msg| Message {
            subject: msg.subject.to_string(),
            reply: msg.reply.map(|r| r.to_string()),
            payload: msg.payload,
        })
        .boxed()
}
