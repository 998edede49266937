//! Ingestion: audio blob, then cover blob, then a one-way notification to
//! the catalog service.
//!
//! There is no transaction spanning the blob store and the catalog. The
//! steps run strictly in order so that a failure is detected before anything
//! is announced, and nothing already written is rolled back:
//!
//! - audio write fails: nothing remains
//! - cover write fails: the audio blob is orphaned
//! - notification fails: both blobs exist without a record
//!
//! Orphans are logged with their content ids for the operator to reconcile.
//! The caller never learns the catalog record id from this path.

use crate::{
    bus::{Bridge, BridgeError, subjects},
    models::{
        blob::BlobHandle,
        messages::{IngestionNotification, UploadSongResponse},
    },
    services::blob_store::{BlobStore, StorageError, StorageResult},
};
use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Size of the slices fed to a blob writer.
const WRITE_SLICE: usize = 64 * 1024;

/// Everything a client supplies to publish one song.
#[derive(Debug, Clone, Default)]
pub struct UploadSong {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub description: String,
    pub owner_id: String,
    pub audio: Bytes,
    pub cover: Bytes,
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("{0}")]
    Invalid(String),
    #[error("failed to store audio: {0}")]
    Audio(#[source] StorageError),
    #[error("failed to store album cover: {0}")]
    Cover(#[source] StorageError),
    #[error(
        "audio {audio_content_id} and cover {cover_content_id} stored but the catalog was not notified: {source}"
    )]
    Notify {
        audio_content_id: Uuid,
        cover_content_id: Uuid,
        #[source]
        source: BridgeError,
    },
}

pub struct IngestionCoordinator {
    blobs: BlobStore,
    bridge: Bridge,
    max_payload_bytes: usize,
}

impl IngestionCoordinator {
    pub fn new(blobs: BlobStore, bridge: Bridge, max_payload_bytes: usize) -> Self {
        Self {
            blobs,
            bridge,
            max_payload_bytes,
        }
    }

    pub async fn ingest(&self, upload: UploadSong) -> Result<UploadSongResponse, IngestionError> {
        self.validate(&upload)?;

        let audio = self
            .write_blob(&upload.title, &upload.audio)
            .await
            .map_err(IngestionError::Audio)?;

        let cover = match self.write_blob(&upload.album, &upload.cover).await {
            Ok(cover) => cover,
            Err(err) => {
                warn!(
                    audio_content_id = %audio.content_id,
                    owner_id = %upload.owner_id,
                    "cover write failed; audio blob is orphaned"
                );
                return Err(IngestionError::Cover(err));
            }
        };

        let notification = IngestionNotification {
            title: upload.title,
            artist: upload.artist,
            album: upload.album,
            description: upload.description,
            owner_id: upload.owner_id,
            audio_content_id: audio.content_id,
            cover_content_id: cover.content_id,
        };

        if let Err(source) = self
            .bridge
            .notify_json(subjects::SONGS_UPLOAD, &notification)
            .await
        {
            error!(
                audio_content_id = %audio.content_id,
                cover_content_id = %cover.content_id,
                owner_id = %notification.owner_id,
                error = %source,
                "partial ingestion: blobs stored without a catalog record"
            );
            return Err(IngestionError::Notify {
                audio_content_id: audio.content_id,
                cover_content_id: cover.content_id,
                source,
            });
        }

        info!(
            audio_content_id = %audio.content_id,
            cover_content_id = %cover.content_id,
            title = %notification.title,
            artist = %notification.artist,
            "song ingested; catalog notified"
        );
        Ok(UploadSongResponse::success(audio.content_id, cover.content_id))
    }

    fn validate(&self, upload: &UploadSong) -> Result<(), IngestionError> {
        if upload.owner_id.trim().is_empty() {
            return Err(IngestionError::Invalid("ownerId is required".into()));
        }
        if upload.title.trim().is_empty() {
            return Err(IngestionError::Invalid("title is required".into()));
        }
        if upload.audio.is_empty() {
            return Err(IngestionError::Invalid("song file is required".into()));
        }
        if upload.cover.is_empty() {
            return Err(IngestionError::Invalid("album cover is required".into()));
        }
        let total = upload.audio.len() + upload.cover.len();
        if total > self.max_payload_bytes {
            return Err(IngestionError::Invalid(format!(
                "upload of {} bytes exceeds the {} byte limit",
                total, self.max_payload_bytes
            )));
        }
        Ok(())
    }

    /// Stream `data` into a fresh blob. The writer is released on every
    /// path: closed on success, aborted on a failed write.
    async fn write_blob(&self, name: &str, data: &[u8]) -> StorageResult<BlobHandle> {
        let mut writer = self.blobs.open_write(name).await?;
        for slice in data.chunks(WRITE_SLICE) {
            if let Err(err) = writer.write(slice).await {
                let content_id = writer.content_id();
                if let Err(cleanup) = writer.abort().await {
                    warn!(content_id = %content_id, error = %cleanup, "failed to abort blob write");
                }
                return Err(err);
            }
        }
        writer.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryTransport, Message, Subscription, Transport, TransportError};
    use crate::db;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Arc;

    /// Delivers nothing on one subject, everything else passes through.
    struct DeafTransport {
        inner: MemoryTransport,
        refuse: &'static str,
    }

    #[async_trait]
    impl Transport for DeafTransport {
        async fn publish(
            &self,
            subject: &str,
            reply: Option<&str>,
            payload: Bytes,
        ) -> Result<(), TransportError> {
            if subject == self.refuse {
                return Err(TransportError::Publish {
                    subject: subject.into(),
                    reason: "connection closed".into(),
                });
            }
            self.inner.publish(subject, reply, payload).await
        }

        async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
            self.inner.subscribe(subject).await
        }

        async fn queue_subscribe(
            &self,
            subject: &str,
            group: &str,
        ) -> Result<Subscription, TransportError> {
            self.inner.queue_subscribe(subject, group).await
        }

        fn new_inbox(&self) -> String {
            self.inner.new_inbox()
        }
    }

    async fn blob_store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_in_memory().await.unwrap();
        let store = BlobStore::new(Arc::new(pool), dir.path()).with_chunk_size(8);
        (dir, store)
    }

    fn upload() -> UploadSong {
        UploadSong {
            title: "A".into(),
            artist: "B".into(),
            album: "C".into(),
            description: "D".into(),
            owner_id: "u1".into(),
            audio: Bytes::from_static(b"audio bytes, more than one chunk"),
            cover: Bytes::from_static(b"cover"),
        }
    }

    #[tokio::test]
    async fn ingest_stores_both_blobs_then_notifies() {
        let (_dir, blobs) = blob_store().await;
        let transport = Arc::new(MemoryTransport::new());
        let mut notifications = transport.subscribe(subjects::SONGS_UPLOAD).await.unwrap();
        let coordinator =
            IngestionCoordinator::new(blobs.clone(), Bridge::new(transport), 1024);

        let response = coordinator.ingest(upload()).await.unwrap();
        assert_eq!(response.message, "Song uploaded successfully");
        assert_eq!(response.status, "success");
        assert_ne!(response.audio_content_id, response.cover_content_id);

        let Message { payload, reply, .. } = notifications.next().await.unwrap();
        assert!(reply.is_none());
        let notification: IngestionNotification = serde_json::from_slice(&payload).unwrap();
        assert_eq!(notification.title, "A");
        assert_eq!(notification.owner_id, "u1");
        assert_eq!(
            notification.audio_content_id.to_string(),
            response.audio_content_id
        );

        let audio = blobs.stat(notification.audio_content_id).await.unwrap();
        assert_eq!(audio.filename, "A");
        assert_eq!(audio.length, upload().audio.len() as i64);
        let cover = blobs.stat(notification.cover_content_id).await.unwrap();
        assert_eq!(cover.filename, "C");
    }

    #[tokio::test]
    async fn failed_notification_reports_partial_ingestion_and_keeps_blobs() {
        let (_dir, blobs) = blob_store().await;
        let transport = Arc::new(DeafTransport {
            inner: MemoryTransport::new(),
            refuse: subjects::SONGS_UPLOAD,
        });
        let coordinator = IngestionCoordinator::new(blobs.clone(), Bridge::new(transport), 1024);

        match coordinator.ingest(upload()).await {
            Err(IngestionError::Notify {
                audio_content_id,
                cover_content_id,
                ..
            }) => {
                assert!(blobs.stat(audio_content_id).await.is_ok());
                assert!(blobs.stat(cover_content_id).await.is_ok());
            }
            other => panic!("expected notify failure, got {other:?}"),
        }
    }

    /// Put a regular file where the shard directory for `chunk` belongs,
    /// so persisting that chunk fails.
    fn block_chunk(dir: &tempfile::TempDir, chunk: &[u8]) {
        let digest = format!("{:x}", md5::compute(chunk));
        let shard = dir.path().join("chunks").join(&digest[0..2]);
        std::fs::create_dir_all(&shard).unwrap();
        std::fs::write(shard.join(&digest[2..4]), b"not a directory").unwrap();
    }

    async fn complete_blobs(blobs: &BlobStore) -> Vec<(String, String)> {
        sqlx::query_as("SELECT id, filename FROM blobs WHERE complete = 1")
            .fetch_all(&*blobs.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn failed_cover_write_orphans_the_audio_and_announces_nothing() {
        let (dir, blobs) = blob_store().await;
        let song = upload();
        block_chunk(&dir, &song.cover);

        let transport = Arc::new(MemoryTransport::new());
        let mut notifications = transport.subscribe(subjects::SONGS_UPLOAD).await.unwrap();
        let coordinator = IngestionCoordinator::new(blobs.clone(), Bridge::new(transport), 1024);

        let err = coordinator.ingest(song).await.unwrap_err();
        assert!(matches!(err, IngestionError::Cover(_)), "got {err:?}");
        assert!(matches!(
            crate::errors::ServiceError::from(err),
            crate::errors::ServiceError::StoreUnavailable(_)
        ));

        // The audio blob stays behind, complete and readable.
        let stored = complete_blobs(&blobs).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1, "A");
        let audio = BlobStore::parse_content_id(&stored[0].0).unwrap();
        assert_eq!(
            blobs.stat(audio).await.unwrap().length,
            upload().audio.len() as i64
        );

        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(100), notifications.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn failed_audio_write_leaves_no_blob() {
        let (dir, blobs) = blob_store().await;
        let song = upload();
        // First 8-byte chunk of the audio.
        block_chunk(&dir, &song.audio[..8]);

        let transport = Arc::new(MemoryTransport::new());
        let mut notifications = transport.subscribe(subjects::SONGS_UPLOAD).await.unwrap();
        let coordinator = IngestionCoordinator::new(blobs.clone(), Bridge::new(transport), 1024);

        let err = coordinator.ingest(song).await.unwrap_err();
        assert!(matches!(err, IngestionError::Audio(_)), "got {err:?}");

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blobs")
            .fetch_one(&*blobs.db)
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(100), notifications.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn invalid_uploads_write_nothing() {
        let (_dir, blobs) = blob_store().await;
        let transport = Arc::new(MemoryTransport::new());
        let coordinator = IngestionCoordinator::new(blobs.clone(), Bridge::new(transport), 16);

        let missing_owner = UploadSong {
            owner_id: " ".into(),
            ..upload()
        };
        assert!(matches!(
            coordinator.ingest(missing_owner).await,
            Err(IngestionError::Invalid(_))
        ));

        // 32 + 5 bytes against a 16 byte cap.
        assert!(matches!(
            coordinator.ingest(upload()).await,
            Err(IngestionError::Invalid(msg)) if msg.contains("limit")
        ));

        let blob_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blobs")
            .fetch_one(&*blobs.db)
            .await
            .unwrap();
        assert_eq!(blob_rows, 0);
    }
}
