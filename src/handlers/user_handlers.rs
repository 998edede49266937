//! HTTP handlers for account registration and sign-in, forwarded to the
//! auth service over the bus.

use crate::{errors::AppError, models::user::Credentials, services::song_rpc::SongRpc};
use axum::{Json, extract::State};
use serde_json::Value;

/// `POST /api/v1/user/reg`
pub async fn register_user(
    State(rpc): State<SongRpc>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(rpc.register_user(&credentials).await?))
}

/// `POST /api/v1/user/auth`
pub async fn authenticate_user(
    State(rpc): State<SongRpc>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(rpc.authenticate_user(&credentials).await?))
}
