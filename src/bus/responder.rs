//! Serving subjects: subject-to-handler routes, one task per message.

use super::{Reply, Transport, TransportError, bridge::BridgeError};
use bytes::Bytes;
use futures::{StreamExt, future::BoxFuture};
use serde::{Serialize, de::DeserializeOwned};
use std::{future::Future, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One inbound message awaiting (at most) one reply.
///
/// `respond` consumes the request, so a handler cannot reply twice.
/// Dropping a request without responding leaves the caller to time out.
pub struct Request {
    subject: String,
    payload: Bytes,
    reply: Option<String>,
    transport: Arc<dyn Transport>,
}

impl Request {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Whether the publisher asked for a reply.
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, BridgeError> {
        serde_json::from_slice(&self.payload).map_err(|source| BridgeError::Codec {
            subject: self.subject.clone(),
            source,
        })
    }

    /// The payload as UTF-8 text, for subjects that carry a bare id.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub async fn respond(self, payload: Bytes) {
        let Some(reply) = self.reply else {
            debug!(subject = %self.subject, "no reply address; reply dropped");
            return;
        };
        if let Err(err) = self.transport.publish(&reply, None, payload).await {
            warn!(subject = %self.subject, error = %err, "failed to publish reply");
        }
    }

    pub async fn respond_json<T: Serialize + ?Sized>(self, body: &T) {
        match serde_json::to_vec(body) {
            Ok(bytes) => self.respond(Bytes::from(bytes)).await,
            Err(err) => {
                error!(subject = %self.subject, error = %err, "failed to encode reply");
                self.respond_error(format!("Failed to encode reply: {}", err))
                    .await
            }
        }
    }

    /// Reply with `{"error": message}`.
    pub async fn respond_error(self, message: impl Into<String>) {
        let body = Reply::<()>::Failure {
            error: message.into(),
        };
        // Encoding a single string field cannot fail.
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        self.respond(Bytes::from(bytes)).await
    }
}

type Handler<S> = Arc<dyn Fn(Arc<S>, Request) -> BoxFuture<'static, ()> + Send + Sync>;

/// Subject routes sharing one piece of state, the way an axum router
/// shares its state with handlers.
pub struct Responder<S> {
    transport: Arc<dyn Transport>,
    state: Arc<S>,
    routes: Vec<(String, Handler<S>)>,
    queue_group: Option<String>,
}

impl<S: Send + Sync + 'static> Responder<S> {
    pub fn new(transport: Arc<dyn Transport>, state: Arc<S>) -> Self {
        Self {
            transport,
            state,
            routes: Vec::new(),
            queue_group: None,
        }
    }

    /// Share every route's subject with other responders in `group`, so
    /// each message is handled by one process only.
    pub fn queue_group(mut self, group: impl Into<String>) -> Self {
        self.queue_group = Some(group.into());
        self
    }

    pub fn route<F, Fut>(mut self, subject: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<S>, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler<S> =
            Arc::new(move |state: Arc<S>, req: Request| -> BoxFuture<'static, ()> {
                Box::pin(handler(state, req))
            });
        self.routes.push((subject.into(), handler));
        self
    }

    /// Subscribe every route, then return. Messages are handled in their
    /// own tasks so a slow or panicking handler never blocks its subject.
    pub async fn serve(self) -> Result<ResponderHandle, TransportError> {
        let mut tasks = Vec::with_capacity(self.routes.len());

        for (subject, handler) in self.routes {
            let mut messages = match &self.queue_group {
                Some(group) => self.transport.queue_subscribe(&subject, group).await?,
                None => self.transport.subscribe(&subject).await?,
            };
            let transport = self.transport.clone();
            let state = self.state.clone();
            info!(subject = %subject, group = ?self.queue_group, "responder subscribed");

            tasks.push(tokio::spawn(async move {
                while let Some(msg) = messages.next().await {
                    let request = Request {
                        subject: msg.subject,
                        payload: msg.payload,
                        reply: msg.reply,
                        transport: transport.clone(),
                    };
                    tokio::spawn(handler(state.clone(), request));
                }
                debug!(subject = %subject, "subscription closed");
            }));
        }

        Ok(ResponderHandle { tasks })
    }
}

/// The receive loops of one or more served responders.
#[derive(Default)]
pub struct ResponderHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl ResponderHandle {
    pub fn merge(&mut self, other: ResponderHandle) {
        self.tasks.extend(other.tasks);
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait until every subscription has closed.
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    error!(error = %err, "responder loop failed");
                }
            }
        }
    }

    /// Stop receiving. Handlers already running are left to finish.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Bridge, MemoryTransport};
    use std::time::Duration;

    #[tokio::test]
    async fn handler_panic_does_not_stop_the_subject() {
        let transport = Arc::new(MemoryTransport::new());
        let bridge = Bridge::new(transport.clone());
        let _handle = Responder::new(transport, Arc::new(()))
            .route("fragile", |_, req| async move {
                if req.payload().as_ref() == b"boom" {
                    panic!("handler bug");
                }
                req.respond(Bytes::from_static(b"fine")).await;
            })
            .serve()
            .await
            .unwrap();

        let timeout = Duration::from_millis(200);
        let err = bridge
            .call("fragile", Bytes::from_static(b"boom"), timeout)
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let reply = bridge
            .call("fragile", Bytes::from_static(b"ok"), timeout)
            .await
            .unwrap();
        assert_eq!(&reply[..], b"fine");
    }

    #[tokio::test]
    async fn responding_without_reply_address_is_harmless() {
        let transport = Arc::new(MemoryTransport::new());
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        let _handle = Responder::new(transport.clone(), Arc::new(seen_tx))
            .route("one.way", |seen, req| async move {
                let _ = seen.send(req.expects_reply());
                req.respond(Bytes::from_static(b"ignored")).await;
            })
            .serve()
            .await
            .unwrap();

        transport.publish("one.way", None, Bytes::new()).await.unwrap();
        let expected = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!expected);
    }

    #[tokio::test]
    async fn shutdown_stops_receiving() {
        let transport = Arc::new(MemoryTransport::new());
        let bridge = Bridge::new(transport.clone());
        let handle = Responder::new(transport, Arc::new(()))
            .route("ping", |_, req| async move {
                req.respond(Bytes::from_static(b"pong")).await;
            })
            .serve()
            .await
            .unwrap();
        handle.shutdown();
        tokio::task::yield_now().await;

        let err = bridge
            .call("ping", Bytes::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn queue_grouped_responders_handle_each_message_once() {
        let transport = Arc::new(MemoryTransport::new());
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
        let seen_tx = Arc::new(seen_tx);
        let mut handle = ResponderHandle::default();
        for _ in 0..2 {
            let served = Responder::new(transport.clone(), seen_tx.clone())
                .queue_group("catalog")
                .route("songs.upload", |seen, _req| async move {
                    let _ = seen.send(1);
                })
                .serve()
                .await
                .unwrap();
            handle.merge(served);
        }

        transport
            .publish("songs.upload", None, Bytes::from_static(b"{}"))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(100), seen_rx.recv())
                .await
                .is_err()
        );
        handle.shutdown();
    }
}
