//! Catalog service: serves the `songs.*` subjects on top of a
//! [`CatalogStore`].

use crate::{
    bus::{Request, Responder, Transport, subjects},
    models::{
        messages::{IngestionNotification, MutationResponse, SongList, UpdateSongRequest},
        song::NewSong,
    },
    services::catalog_store::{CatalogStore, UpdateOutcome, parse_song_id},
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const NOT_FOUND: &str = "No song found with the specified ID";
pub const INVALID_ID: &str = "Invalid song ID";
pub const DELETED: &str = "Song deleted successfully";
pub const UPDATED: &str = "Song metadata updated successfully";

pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn responder(self: Arc<Self>, transport: Arc<dyn Transport>) -> Responder<Self> {
        Responder::new(transport, self)
            .queue_group("songbird.catalog")
            .route(subjects::SONGS_UPLOAD, |svc, req| async move {
                svc.upload(req).await
            })
            .route(subjects::SONGS_ALL, |svc, req| async move {
                svc.list_all(req).await
            })
            .route(subjects::SONGS_USER, |svc, req| async move {
                svc.list_user(req).await
            })
            .route(subjects::SONGS_UPDATE, |svc, req| async move {
                svc.update(req).await
            })
            .route(subjects::SONGS_DELETE, |svc, req| async move {
                svc.delete(req).await
            })
    }

    /// One-way: nobody is waiting, so every failure ends in the log.
    async fn upload(&self, req: Request) {
        let notification: IngestionNotification = match req.json() {
            Ok(n) => n,
            Err(err) => {
                error!(error = %err, "discarding malformed ingestion notification");
                return;
            }
        };
        let audio = notification.audio_content_id;
        let cover = notification.cover_content_id;
        match self.store.insert(NewSong::from(notification)).await {
            Ok(record_id) => info!(
                record_id = %record_id,
                audio_content_id = %audio,
                cover_content_id = %cover,
                "catalog record created"
            ),
            Err(err) => error!(
                audio_content_id = %audio,
                cover_content_id = %cover,
                error = %err,
                "catalog insert failed; blobs are orphaned"
            ),
        }
    }

    async fn list_all(&self, req: Request) {
        match self.store.find_all().await {
            Ok(records) => req.respond_json(&SongList { records }).await,
            Err(err) => {
                warn!(error = %err, "listing songs failed");
                req.respond_error(format!("Failed to fetch songs: {}", err))
                    .await
            }
        }
    }

    async fn list_user(&self, req: Request) {
        let Some(owner_id) = req.text().map(|s| s.trim().to_string()) else {
            return req.respond_error("owner id is not valid UTF-8").await;
        };
        match self.store.find_by_owner(&owner_id).await {
            Ok(records) => {
                debug!(owner_id = %owner_id, count = records.len(), "listed user songs");
                req.respond_json(&SongList { records }).await
            }
            Err(err) => {
                warn!(owner_id = %owner_id, error = %err, "listing user songs failed");
                req.respond_error(format!("Failed to fetch songs: {}", err))
                    .await
            }
        }
    }

    async fn update(&self, req: Request) {
        let request: UpdateSongRequest = match req.json() {
            Ok(r) => r,
            Err(err) => {
                return req
                    .respond_json(&MutationResponse::failed(err.to_string()))
                    .await;
            }
        };
        let Ok(id) = parse_song_id(&request.id) else {
            return req.respond_json(&MutationResponse::failed(INVALID_ID)).await;
        };

        let reply = match self.store.update(id, request.fields()).await {
            Ok(UpdateOutcome::Updated) => {
                info!(record_id = %id, "song metadata updated");
                MutationResponse::ok(UPDATED)
            }
            Ok(UpdateOutcome::NotFound) => MutationResponse::failed(NOT_FOUND),
            Err(err) => {
                warn!(record_id = %id, error = %err, "song update failed");
                MutationResponse::failed(format!("Failed to update song: {}", err))
            }
        };
        req.respond_json(&reply).await
    }

    async fn delete(&self, req: Request) {
        let Some(Ok(id)) = req.text().map(parse_song_id) else {
            return req.respond_json(&MutationResponse::failed(INVALID_ID)).await;
        };

        let reply = match self.store.delete_by_id(id).await {
            Ok(0) => MutationResponse::failed(NOT_FOUND),
            Ok(_) => {
                info!(record_id = %id, "song deleted");
                MutationResponse::ok(DELETED)
            }
            Err(err) => {
                warn!(record_id = %id, error = %err, "song delete failed");
                MutationResponse::failed(format!("Failed to delete song: {}", err))
            }
        };
        req.respond_json(&reply).await
    }
}
