//! HTTP handlers for the song RPC surface.
//! Blob downloads are streamed in fixed-size chunks; nothing is buffered
//! whole on the way out.

use crate::{
    errors::{AppError, ServiceError},
    models::{
        messages::{
            DeleteSongRequest, MutationResponse, SongList, UpdateSongRequest, UploadSongResponse,
        },
        song::SongFields,
    },
    services::{ingestion::UploadSong, song_rpc::SongRpc, streaming::ChunkStream},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Deserialize;

/// Query params accepted by `DELETE /songs/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSongQuery {
    pub audio_content_id: String,
    pub cover_content_id: String,
}

/// `POST /songs` with multipart fields `title`, `artist`, `album`,
/// `description`, `ownerId`, `songFile` and `albumCover`.
pub async fn upload_song(
    State(rpc): State<SongRpc>,
    mut multipart: Multipart,
) -> Result<Json<UploadSongResponse>, AppError> {
    let mut upload = UploadSong::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let invalid = |e: axum::extract::multipart::MultipartError| {
            AppError::bad_request(format!("invalid field `{}`: {}", name, e))
        };
        match name.as_str() {
            "title" => upload.title = field.text().await.map_err(invalid)?,
            "artist" => upload.artist = field.text().await.map_err(invalid)?,
            "album" => upload.album = field.text().await.map_err(invalid)?,
            "description" => upload.description = field.text().await.map_err(invalid)?,
            "ownerId" => upload.owner_id = field.text().await.map_err(invalid)?,
            "songFile" => upload.audio = field.bytes().await.map_err(invalid)?,
            "albumCover" => upload.cover = field.bytes().await.map_err(invalid)?,
            other => tracing::debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let response = rpc.upload_song(upload).await?;
    Ok(Json(response))
}

/// `GET /songs`
pub async fn list_songs(State(rpc): State<SongRpc>) -> Result<Json<SongList>, AppError> {
    Ok(Json(rpc.get_all_songs().await?))
}

/// `GET /users/{owner_id}/songs`
pub async fn list_user_songs(
    State(rpc): State<SongRpc>,
    Path(owner_id): Path<String>,
) -> Result<Json<SongList>, AppError> {
    Ok(Json(rpc.get_user_songs(&owner_id).await?))
}

/// `PUT /songs/{id}` overwrites all four descriptive fields.
pub async fn update_song(
    State(rpc): State<SongRpc>,
    Path(id): Path<String>,
    Json(fields): Json<SongFields>,
) -> Result<Json<MutationResponse>, AppError> {
    let request = UpdateSongRequest {
        id,
        title: fields.title,
        artist: fields.artist,
        album: fields.album,
        description: fields.description,
    };
    Ok(Json(rpc.update_song_metadata(request).await?))
}

/// `DELETE /songs/{id}?audioContentId=..&coverContentId=..`
pub async fn delete_song(
    State(rpc): State<SongRpc>,
    Path(record_id): Path<String>,
    Query(q): Query<DeleteSongQuery>,
) -> Result<Json<MutationResponse>, AppError> {
    let request = DeleteSongRequest {
        record_id,
        audio_content_id: q.audio_content_id,
        cover_content_id: q.cover_content_id,
    };
    Ok(Json(rpc.delete_song(request).await?))
}

/// `GET /songs/files/{content_id}`
pub async fn stream_song_file(
    State(rpc): State<SongRpc>,
    Path(content_id): Path<String>,
) -> Result<Response, AppError> {
    streaming_response(rpc.stream_song_file(&content_id).await)
}

/// `GET /songs/covers/{content_id}`
pub async fn stream_album_cover(
    State(rpc): State<SongRpc>,
    Path(content_id): Path<String>,
) -> Result<Response, AppError> {
    streaming_response(rpc.stream_album_cover(&content_id).await)
}

fn streaming_response(stream: Result<ChunkStream, ServiceError>) -> Result<Response, AppError> {
    let mut response = Response::new(Body::from_stream(stream?));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    Ok(response)
}
