//! Auth service: registration and token issuance in front of the users
//! service.

use crate::{
    bus::{Bridge, BridgeError, Request, Responder, decode_reply, subjects},
    models::user::{AuthReply, Credentials, RegisterReply, User},
    services::{session_store::SessionStore, users_service::hash_password},
};
use bytes::Bytes;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub const AUTHENTICATED: &str = "Authenticated";
pub const ALREADY_REGISTERED: &str = "User already registered";
pub const NOT_REGISTERED: &str = "User not registered";
pub const BAD_CREDENTIALS: &str = "Invalid username or password";

/// What `users.get` answers: a user or the literal `false`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lookup {
    Found(User),
    Missing(bool),
}

pub struct AuthService {
    bridge: Bridge,
    sessions: SessionStore,
    timeout: Duration,
}

impl AuthService {
    pub fn new(bridge: Bridge, sessions: SessionStore, timeout: Duration) -> Self {
        Self {
            bridge,
            sessions,
            timeout,
        }
    }

    pub fn responder(self: Arc<Self>) -> Responder<Self> {
        let transport = self.bridge.transport();
        Responder::new(transport, self)
            .queue_group("songbird.auth")
            .route(subjects::AUTH_REGISTER, |svc, req| async move {
                svc.register(req).await
            })
            .route(subjects::AUTH_AUTHENTICATE, |svc, req| async move {
                svc.authenticate(req).await
            })
    }

    async fn lookup(&self, username: &str) -> Result<Option<User>, BridgeError> {
        let lookup: Lookup = self
            .bridge
            .call_decoded(
                subjects::USERS_GET,
                Bytes::from(username.to_string()),
                self.timeout,
            )
            .await?;
        Ok(match lookup {
            Lookup::Found(user) => Some(user),
            Lookup::Missing(_) => None,
        })
    }

    /// Forwards the users service's reply. A session is issued only once
    /// the account actually exists.
    async fn register(&self, req: Request) {
        let credentials: Credentials = match req.json() {
            Ok(c) => c,
            Err(err) => return req.respond_error(format!("Invalid data: {}", err)).await,
        };

        match self.sessions.get(&credentials.username).await {
            Ok(Some(_)) => return req.respond_error(ALREADY_REGISTERED).await,
            Ok(None) => {}
            Err(err) => return req.respond_error(format!("Session store error: {}", err)).await,
        }
        match self.lookup(&credentials.username).await {
            Ok(Some(_)) => return req.respond_error(ALREADY_REGISTERED).await,
            Ok(None) => {}
            Err(err) => return req.respond_error(format!("Users service error: {}", err)).await,
        }

        let reply = match self
            .bridge
            .call(subjects::USERS_REGISTER, req.payload().clone(), self.timeout)
            .await
        {
            Ok(reply) => reply,
            Err(err) => return req.respond_error(format!("Users service error: {}", err)).await,
        };

        if decode_reply::<RegisterReply>(subjects::USERS_REGISTER, &reply).is_ok() {
            if let Err(err) = self.sessions.issue(&credentials.username).await {
                warn!(username = %credentials.username, error = %err, "registered but no session issued");
                return req.respond_error(format!("Session store error: {}", err)).await;
            }
            info!(username = %credentials.username, "registered");
        }
        req.respond(reply).await
    }

    async fn authenticate(&self, req: Request) {
        let credentials: Credentials = match req.json() {
            Ok(c) => c,
            Err(err) => return req.respond_error(format!("Invalid data: {}", err)).await,
        };

        let user = match self.lookup(&credentials.username).await {
            Ok(Some(user)) => user,
            Ok(None) => return req.respond_error(NOT_REGISTERED).await,
            Err(err) => return req.respond_error(format!("Users service error: {}", err)).await,
        };
        if user.password != hash_password(&credentials.password) {
            return req.respond_error(BAD_CREDENTIALS).await;
        }

        match self.sessions.get_or_issue(&user.username).await {
            Ok(session) => {
                req.respond_json(&AuthReply {
                    status: AUTHENTICATED.into(),
                    token: session.token,
                })
                .await
            }
            Err(err) => req.respond_error(format!("Session store error: {}", err)).await,
        }
    }
}
