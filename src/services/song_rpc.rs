//! The song RPC surface: the gateway side of every client operation.
//!
//! Blob traffic is served directly from the local blob store; everything
//! touching catalog records goes over the bus to the catalog service, and
//! account traffic to the auth service.

use crate::{
    bus::{Bridge, subjects},
    errors::ServiceError,
    models::{
        messages::{
            DeleteSongRequest, MutationResponse, SongList, UpdateSongRequest, UploadSongResponse,
        },
        user::Credentials,
    },
    services::{
        blob_store::{BlobStore, StorageError},
        ingestion::{IngestionCoordinator, UploadSong},
        streaming::{ChunkStream, open_chunk_stream},
    },
};
use bytes::Bytes;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Registration waits this many request timeouts; it spans two hops.
pub const REGISTER_TIMEOUT_FACTOR: u32 = 5;

#[derive(Clone)]
pub struct SongRpc {
    blobs: BlobStore,
    bridge: Bridge,
    ingestion: Arc<IngestionCoordinator>,
    request_timeout: Duration,
}

impl SongRpc {
    pub fn new(
        blobs: BlobStore,
        bridge: Bridge,
        request_timeout: Duration,
        max_payload_bytes: usize,
    ) -> Self {
        let ingestion = Arc::new(IngestionCoordinator::new(
            blobs.clone(),
            bridge.clone(),
            max_payload_bytes,
        ));
        Self {
            blobs,
            bridge,
            ingestion,
            request_timeout,
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub async fn upload_song(&self, upload: UploadSong) -> ServiceResult<UploadSongResponse> {
        Ok(self.ingestion.ingest(upload).await?)
    }

    pub async fn stream_song_file(&self, content_id: &str) -> ServiceResult<ChunkStream> {
        Ok(open_chunk_stream(&self.blobs, content_id).await?)
    }

    pub async fn stream_album_cover(&self, content_id: &str) -> ServiceResult<ChunkStream> {
        Ok(open_chunk_stream(&self.blobs, content_id).await?)
    }

    pub async fn get_user_songs(&self, owner_id: &str) -> ServiceResult<SongList> {
        let payload = Bytes::from(owner_id.to_string());
        Ok(self
            .bridge
            .call_decoded(subjects::SONGS_USER, payload, self.request_timeout)
            .await?)
    }

    pub async fn get_all_songs(&self) -> ServiceResult<SongList> {
        Ok(self
            .bridge
            .call_decoded(subjects::SONGS_ALL, Bytes::new(), self.request_timeout)
            .await?)
    }

    pub async fn update_song_metadata(
        &self,
        request: UpdateSongRequest,
    ) -> ServiceResult<MutationResponse> {
        Ok(self
            .bridge
            .call_json(subjects::SONGS_UPDATE, &request, self.request_timeout)
            .await?)
    }

    /// Forward to `auth.register`. The reply comes back as the auth service
    /// sent it, `{"error": ...}` included.
    pub async fn register_user(&self, credentials: &Credentials) -> ServiceResult<Value> {
        let timeout = self.request_timeout * REGISTER_TIMEOUT_FACTOR;
        self.forward(subjects::AUTH_REGISTER, credentials, timeout)
            .await
    }

    /// Forward to `auth.authenticate`, reply passed through like
    /// [`Self::register_user`].
    pub async fn authenticate_user(&self, credentials: &Credentials) -> ServiceResult<Value> {
        self.forward(subjects::AUTH_AUTHENTICATE, credentials, self.request_timeout)
            .await
    }

    async fn forward(
        &self,
        subject: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> ServiceResult<Value> {
        let payload = serde_json::to_vec(credentials)
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        let reply = self
            .bridge
            .call(subject, Bytes::from(payload), timeout)
            .await?;
        serde_json::from_slice(&reply)
            .map_err(|e| ServiceError::Decode(format!("reply from `{}`: {}", subject, e)))
    }

    /// Delete the record, then its two blobs.
    ///
    /// Both content ids are checked up front so a malformed one cannot
    /// leave a deleted record with blobs nobody can name. Blobs are touched
    /// only after the catalog confirms the record is gone.
    ///
    /// The content ids are taken as given and never matched against the
    /// record. Ids belonging to a different song delete that song's blobs
    /// and leave its record pointing at nothing, so callers must pass the
    /// ids listed on the record they delete.
    pub async fn delete_song(&self, request: DeleteSongRequest) -> ServiceResult<MutationResponse> {
        let audio = BlobStore::parse_content_id(&request.audio_content_id)?;
        let cover = BlobStore::parse_content_id(&request.cover_content_id)?;

        let reply: MutationResponse = self
            .bridge
            .call_decoded(
                subjects::SONGS_DELETE,
                Bytes::from(request.record_id.clone()),
                self.request_timeout,
            )
            .await?;
        if !reply.success {
            return Ok(reply);
        }

        for content_id in [audio, cover] {
            match self.blobs.delete(content_id).await {
                Ok(()) => {}
                Err(StorageError::BlobNotFound(_)) => {
                    warn!(
                        record_id = %request.record_id,
                        content_id = %content_id,
                        "blob already gone during song delete"
                    );
                }
                Err(err) => {
                    warn!(
                        record_id = %request.record_id,
                        content_id = %content_id,
                        error = %err,
                        "record deleted but blob cleanup failed"
                    );
                    return Err(err.into());
                }
            }
        }

        info!(record_id = %request.record_id, "song and blobs deleted");
        Ok(reply)
    }
}
