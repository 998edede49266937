//! Payloads exchanged over the bus and returned by the RPC surface.

use crate::models::song::{NewSong, Song, SongFields};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One-way message from the ingestion coordinator to the catalog service.
/// Carries a complete record minus the store-assigned id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionNotification {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub description: String,
    pub owner_id: String,
    pub audio_content_id: Uuid,
    pub cover_content_id: Uuid,
}

impl From<IngestionNotification> for NewSong {
    fn from(n: IngestionNotification) -> Self {
        NewSong {
            title: n.title,
            artist: n.artist,
            album: n.album,
            description: n.description,
            owner_id: n.owner_id,
            audio_content_id: n.audio_content_id,
            cover_content_id: n.cover_content_id,
        }
    }
}

/// Bounded reply to the list subjects. Empty when nothing matched.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SongList {
    pub records: Vec<Song>,
}

/// Request on the update subject. The id travels as text so that a
/// malformed id is answered with a failed mutation rather than dropped.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSongRequest {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub description: String,
}

impl UpdateSongRequest {
    pub fn fields(&self) -> SongFields {
        SongFields {
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            description: self.description.clone(),
        }
    }
}

/// Reply to update and delete requests.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MutationResponse {
    pub success: bool,
    pub message: String,
}

impl MutationResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Record id plus the two blobs to remove once the record is gone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSongRequest {
    pub record_id: String,
    pub audio_content_id: String,
    pub cover_content_id: String,
}

/// Result of a successful upload. The catalog record id is not known yet;
/// only the two provisional blob ids are.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadSongResponse {
    pub message: String,
    pub status: String,
    pub audio_content_id: String,
    pub cover_content_id: String,
}

impl UploadSongResponse {
    pub fn success(audio_content_id: Uuid, cover_content_id: Uuid) -> Self {
        Self {
            message: "Song uploaded successfully".into(),
            status: "success".into(),
            audio_content_id: audio_content_id.to_string(),
            cover_content_id: cover_content_id.to_string(),
        }
    }
}
