//! In-process transport for single-binary deployments and tests.

use super::{Message, Subscription, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

struct Subscriber {
    tx: mpsc::UnboundedSender<Message>,
    group: Option<String>,
}

type Subscribers = HashMap<String, Vec<Subscriber>>;

fn lock(subscribers: &Mutex<Subscribers>) -> MutexGuard<'_, Subscribers> {
    subscribers
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drops closed senders on `subject`, and the subject itself once empty.
fn prune(subscribers: &mut Subscribers, subject: &str) {
    if let Some(subs) = subscribers.get_mut(subject) {
        subs.retain(|sub| !sub.tx.is_closed());
        if subs.is_empty() {
            subscribers.remove(subject);
        }
    }
}

/// Receiving end of one subscription. Unregisters itself when dropped, so
/// one-shot reply inboxes leave nothing behind.
struct Inbox {
    rx: mpsc::UnboundedReceiver<Message>,
    subject: String,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Drop for Inbox {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(subscribers) = self.subscribers.upgrade() {
            prune(&mut lock(&subscribers), &self.subject);
        }
    }
}

/// Subject-keyed fan-out over unbounded channels.
///
/// Every plain subscriber of a subject receives each message published on
/// it. Queue subscribers sharing a group receive it once per group, on the
/// earliest live member. Publishing to a subject nobody listens on is a
/// silent no-op.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        lock(&self.subscribers)
    }

    /// Number of live subscribers on `subject`.
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.lock()
            .get(subject)
            .map(|subs| subs.iter().filter(|sub| !sub.tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of subjects with at least one registered subscriber.
    pub fn subject_count(&self) -> usize {
        self.lock().len()
    }

    fn register(&self, subject: &str, group: Option<&str>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()
            .entry(subject.to_string())
            .or_default()
            .push(Subscriber {
                tx,
                group: group.map(str::to_string),
            });

        let inbox = Inbox {
            rx,
            subject: subject.to_string(),
            subscribers: Arc::downgrade(&self.subscribers),
        };
        futures::stream::unfold(inbox, |mut inbox| async move {
            inbox.rx.recv().await.map(|msg| (msg, inbox))
        })
        .boxed()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let message = Message {
            subject: subject.to_string(),
            reply: reply.map(str::to_string),
            payload,
        };

        let mut subscribers = self.lock();
        let Some(subs) = subscribers.get(subject) else {
            trace!(subject, "no subscribers; message dropped");
            return Ok(());
        };
        let mut served: Vec<&str> = Vec::new();
        for sub in subs {
            match sub.group.as_deref() {
                None => {
                    let _ = sub.tx.send(message.clone());
                }
                Some(group) if !served.contains(&group) => {
                    if sub.tx.send(message.clone()).is_ok() {
                        served.push(group);
                    }
                }
                Some(_) => {}
            }
        }
        prune(&mut subscribers, subject);
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
        Ok(self.register(subject, None))
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
    ) -> Result<Subscription, TransportError> {
        Ok(self.register(subject, Some(group)))
    }

    fn new_inbox(&self) -> String {
        format!("_INBOX.{}", Uuid::new_v4().simple())
    }
}
