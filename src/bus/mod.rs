//! Message bus plumbing.
//!
//! A [`Transport`] delivers messages fire-and-forget; the [`Bridge`] layers
//! synchronous-looking request/reply on top of it using one-shot reply
//! inboxes, and a [`Responder`] serves subject handlers.

pub mod bridge;
pub mod memory;
pub mod nats;
pub mod responder;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

pub use bridge::{Bridge, BridgeError, Reply, decode_reply};
pub use memory::MemoryTransport;
pub use nats::NatsTransport;
pub use responder::{Request, Responder, ResponderHandle};

/// Subjects served by the services in this crate.
pub mod subjects {
    pub const AUTH_REGISTER: &str = "auth.register";
    pub const AUTH_AUTHENTICATE: &str = "auth.authenticate";
    pub const USERS_REGISTER: &str = "users.register";
    pub const USERS_GET: &str = "users.get";
    /// One-way.
    pub const SONGS_UPLOAD: &str = "songs.upload";
    pub const SONGS_USER: &str = "songs.user";
    pub const SONGS_ALL: &str = "songs.all";
    pub const SONGS_UPDATE: &str = "songs.update";
    pub const SONGS_DELETE: &str = "songs.delete";
}

/// A message as delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    /// Where the publisher expects a reply, if anywhere.
    pub reply: Option<String>,
    pub payload: Bytes,
}

/// Messages arriving on one subscription. Dropping it unsubscribes.
pub type Subscription = BoxStream<'static, Message>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("publish to `{subject}` failed: {reason}")]
    Publish { subject: String, reason: String },
    #[error("subscribe to `{subject}` failed: {reason}")]
    Subscribe { subject: String, reason: String },
    #[error("connecting to bus failed: {0}")]
    Connect(String),
}

/// Fire-and-forget message delivery between services.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publish `payload` on `subject`, optionally naming a reply subject.
    async fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Bytes,
    ) -> Result<(), TransportError>;

    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError>;

    /// Subscribe as one member of `group`. Each message reaches a single
    /// member of the group.
    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
    ) -> Result<Subscription, TransportError>;

    /// A subject nobody else will ever publish on unprompted.
    fn new_inbox(&self) -> String;
}
