//! Defines routes for the song RPC surface.
//!
//! ## Structure
//! - **Catalog endpoints** (answered over the bus by the catalog service)
//!   - `GET    /songs`: all songs
//!   - `GET    /users/{owner_id}/songs`: songs uploaded by one user
//!   - `PUT    /songs/{id}`: overwrite title, artist, album, description
//!   - `DELETE /songs/{id}?audioContentId=&coverContentId=`: delete record, then blobs
//!
//! - **Blob endpoints** (served from the local blob store)
//!   - `POST   /songs`: multipart upload of audio, cover and metadata
//!   - `GET    /songs/files/{content_id}`: stream an audio blob
//!   - `GET    /songs/covers/{content_id}`: stream a cover blob
//!
//! - **Account endpoints** (answered over the bus by the auth service)
//!   - `POST   /api/v1/user/reg`: register, JSON `{username, password}`
//!   - `POST   /api/v1/user/auth`: authenticate and receive a token

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        song_handlers::{
            delete_song, list_songs, list_user_songs, stream_album_cover, stream_song_file,
            update_song, upload_song,
        },
        user_handlers::{authenticate_user, register_user},
    },
    services::song_rpc::SongRpc,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Build the router for every song and account route.
///
/// Request bodies above `max_body_bytes` are rejected before any handler
/// runs. The router carries `SongRpc` as shared state.
pub fn routes(max_body_bytes: usize) -> Router<SongRpc> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/songs", get(list_songs).post(upload_song))
        .route("/songs/{id}", put(update_song).delete(delete_song))
        .route("/songs/files/{content_id}", get(stream_song_file))
        .route("/songs/covers/{content_id}", get(stream_album_cover))
        .route("/users/{owner_id}/songs", get(list_user_songs))
        .route("/api/v1/user/reg", post(register_user))
        .route("/api/v1/user/auth", post(authenticate_user))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}
