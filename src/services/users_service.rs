//! Users service: account records behind `users.register` and `users.get`.

use crate::{
    bus::{Request, Responder, Transport, subjects},
    models::user::{Credentials, RegisterReply, User},
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const REGISTERED: &str = "User registered successfully";

#[derive(Debug, Error)]
pub enum UserError {
    #[error("User already exists")]
    AlreadyExists,
    #[error("username and password are required")]
    MissingField,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Hex SHA-256 of the clear-text password.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    username: String,
    password_hash: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            password: row.password_hash,
        }
    }
}

pub struct UsersService {
    db: Arc<SqlitePool>,
}

impl UsersService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub fn responder(self: Arc<Self>, transport: Arc<dyn Transport>) -> Responder<Self> {
        Responder::new(transport, self)
            .queue_group("songbird.users")
            .route(subjects::USERS_REGISTER, |svc, req| async move {
                svc.handle_register(req).await
            })
            .route(subjects::USERS_GET, |svc, req| async move {
                svc.handle_get(req).await
            })
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<User, UserError> {
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(UserError::MissingField);
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: credentials.username.clone(),
            password: hash_password(&credentials.password),
        };
        let result = sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => {
                info!(username = %user.username, user_id = %user.id, "user registered");
                Ok(user)
            }
            Err(err) if is_unique_violation(&err) => Err(UserError::AlreadyExists),
            Err(err) => Err(UserError::Sqlx(err)),
        }
    }

    pub async fn find(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row.map(User::from))
    }

    async fn handle_register(&self, req: Request) {
        let credentials: Credentials = match req.json() {
            Ok(c) => c,
            Err(err) => return req.respond_error(format!("Invalid data: {}", err)).await,
        };
        match self.register(&credentials).await {
            Ok(user) => {
                req.respond_json(&RegisterReply {
                    status: REGISTERED.into(),
                    user_id: user.id,
                })
                .await
            }
            Err(UserError::Sqlx(err)) => {
                warn!(error = %err, "user insert failed");
                req.respond_error(format!("Failed to register user: {}", err))
                    .await
            }
            Err(err) => req.respond_error(err.to_string()).await,
        }
    }

    /// Replies with the user, or the literal `false` when there is none.
    async fn handle_get(&self, req: Request) {
        let Some(username) = req.text().map(str::to_string) else {
            return req.respond_error("username is not valid UTF-8").await;
        };
        match self.find(&username).await {
            Ok(Some(user)) => req.respond_json(&user).await,
            Ok(None) => req.respond_json(&false).await,
            Err(err) => {
                warn!(username = %username, error = %err, "user lookup failed");
                req.respond_error(format!("Failed to retrieve user: {}", err))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn service() -> UsersService {
        UsersService::new(Arc::new(db::connect_in_memory().await.unwrap()))
    }

    fn creds(username: &str) -> Credentials {
        Credentials {
            username: username.into(),
            password: "hunter2".into(),
        }
    }

    #[test]
    fn password_hash_is_hex_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn registered_user_is_found_with_hashed_password() {
        let svc = service().await;
        let user = svc.register(&creds("alice")).await.unwrap();
        let found = svc.find("alice").await.unwrap().unwrap();
        assert_eq!(found, user);
        assert_eq!(found.password, hash_password("hunter2"));
        assert!(svc.find("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let svc = service().await;
        svc.register(&creds("alice")).await.unwrap();
        assert!(matches!(
            svc.register(&creds("alice")).await,
            Err(UserError::AlreadyExists)
        ));
        assert!(matches!(
            svc.register(&creds(" ")).await,
            Err(UserError::MissingField)
        ));
    }
}
