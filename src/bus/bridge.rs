//! Request/reply over a fire-and-forget transport.
//!
//! `call` subscribes to a fresh inbox, publishes the request naming that
//! inbox as reply address, then waits for the first message on it or for
//! the timeout, whichever comes first. The timeout only ends the caller's
//! wait; the responder keeps working and its late reply lands on an inbox
//! nobody listens to anymore.

use super::{Transport, TransportError};
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("request to `{subject}` timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The responder answered, and the answer was an error.
    #[error("`{subject}` replied with an error: {message}")]
    Remote { subject: String, message: String },
    #[error("reply inbox for `{0}` closed before a reply arrived")]
    NoReply(String),
    #[error("payload for `{subject}` could not be encoded or decoded: {source}")]
    Codec {
        subject: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BridgeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}

/// Reply convention for JSON subjects: either the expected body or
/// `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Reply<T> {
    Failure { error: String },
    Success(T),
}

#[derive(Clone)]
pub struct Bridge {
    transport: Arc<dyn Transport>,
}

impl Bridge {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Publish `payload` on `subject` and wait at most `timeout` for the
    /// single reply. Exactly one reply is consumed per call.
    pub async fn call(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, BridgeError> {
        let inbox = self.transport.new_inbox();
        // Subscribe before publishing so a fast responder cannot beat us.
        let mut replies = self.transport.subscribe(&inbox).await?;
        self.transport.publish(subject, Some(&inbox), payload).await?;
        debug!(subject, inbox = %inbox, "request published");

        match tokio::time::timeout(timeout, replies.next()).await {
            Ok(Some(reply)) => Ok(reply.payload),
            Ok(None) => Err(BridgeError::NoReply(subject.to_string())),
            Err(_) => {
                warn!(subject, ?timeout, "request timed out");
                Err(BridgeError::Timeout {
                    subject: subject.to_string(),
                    timeout,
                })
            }
        }
    }

    /// One-way publish. No reply, no timeout.
    pub async fn notify(&self, subject: &str, payload: Bytes) -> Result<(), BridgeError> {
        self.transport.publish(subject, None, payload).await?;
        debug!(subject, "notification published");
        Ok(())
    }

    /// `call` with a raw payload and a JSON reply.
    pub async fn call_decoded<Resp: DeserializeOwned>(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Resp, BridgeError> {
        let reply = self.call(subject, payload, timeout).await?;
        decode_reply(subject, &reply)
    }

    /// `call` with JSON in both directions.
    pub async fn call_json<Req, Resp>(
        &self,
        subject: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp, BridgeError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = encode(subject, request)?;
        self.call_decoded(subject, payload, timeout).await
    }

    pub async fn notify_json<T: Serialize + ?Sized>(
        &self,
        subject: &str,
        message: &T,
    ) -> Result<(), BridgeError> {
        let payload = encode(subject, message)?;
        self.notify(subject, payload).await
    }
}

fn encode<T: Serialize + ?Sized>(subject: &str, value: &T) -> Result<Bytes, BridgeError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|source| BridgeError::Codec {
            subject: subject.to_string(),
            source,
        })
}

/// Decode a JSON reply, turning `{"error": ...}` into [`BridgeError::Remote`].
pub fn decode_reply<T: DeserializeOwned>(subject: &str, payload: &[u8]) -> Result<T, BridgeError> {
    match serde_json::from_slice::<Reply<T>>(payload) {
        Ok(Reply::Success(body)) => Ok(body),
        Ok(Reply::Failure { error }) => Err(BridgeError::Remote {
            subject: subject.to_string(),
            message: error,
        }),
        Err(source) => Err(BridgeError::Codec {
            subject: subject.to_string(),
            source,
        }),
    }
}
