//! Users and their bearer-token sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user as exchanged between the auth and users services.
/// `password` holds the hash, never the clear text.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
}

/// Username and clear-text password as submitted by a client.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A live bearer token. One per username.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterReply {
    pub status: String,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthReply {
    pub status: String,
    pub token: String,
}
