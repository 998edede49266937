//! Bearer-token sessions, one live token per username.

use crate::models::user::Session;
use chrono::{DateTime, Duration as TimeDelta, Utc};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// How long an issued token stays valid.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Produces new bearer tokens. Swap in a different source to change the
/// token format without touching session bookkeeping.
pub trait TokenSource: Send + Sync {
    fn generate(&self) -> String;
}

/// Random UUID v4 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn generate(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[derive(FromRow)]
struct SessionRow {
    username: String,
    token: String,
    expires_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            username: row.username,
            token: row.token,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    db: Arc<SqlitePool>,
    tokens: Arc<dyn TokenSource>,
}

impl SessionStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self::with_tokens(db, Arc::new(RandomTokens))
    }

    pub fn with_tokens(db: Arc<SqlitePool>, tokens: Arc<dyn TokenSource>) -> Self {
        Self { db, tokens }
    }

    /// The live session for `username`. Expired rows count as absent.
    pub async fn get(&self, username: &str) -> Result<Option<Session>, sqlx::Error> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT username, token, expires_at FROM sessions WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row
            .filter(|row| row.expires_at > Utc::now())
            .map(Session::from))
    }

    /// Issue a fresh token for `username`, replacing any previous one.
    pub async fn issue(&self, username: &str) -> Result<Session, sqlx::Error> {
        let session = Session {
            username: username.to_string(),
            token: self.tokens.generate(),
            expires_at: Utc::now() + TimeDelta::days(SESSION_TTL_DAYS),
        };
        sqlx::query(
            "INSERT INTO sessions (username, token, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(username) DO UPDATE SET token = excluded.token,
                                                 expires_at = excluded.expires_at",
        )
        .bind(&session.username)
        .bind(&session.token)
        .bind(session.expires_at)
        .execute(&*self.db)
        .await?;
        debug!(username, "session issued");
        Ok(session)
    }

    /// The live session if there is one, otherwise a newly issued one.
    pub async fn get_or_issue(&self, username: &str) -> Result<Session, sqlx::Error> {
        match self.get(username).await? {
            Some(session) => Ok(session),
            None => self.issue(username).await,
        }
    }
}
