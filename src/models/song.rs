//! Represents a catalog record describing one uploaded song.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A published song.
///
/// The two content ids reference blobs owned by the blob store. They are
/// fixed at creation; only the descriptive fields can be overwritten.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    /// Identifier assigned by the catalog store on insert.
    pub id: Uuid,

    pub title: String,
    pub artist: String,
    pub album: String,

    /// Free-text description supplied by the uploader.
    pub description: String,

    /// Identifier of the user who uploaded the song.
    pub owner_id: String,

    /// Blob holding the audio payload.
    pub audio_content_id: Uuid,

    /// Blob holding the album cover image.
    pub cover_content_id: Uuid,

    pub created_at: DateTime<Utc>,
}

/// Everything a record carries before the store assigns its id and
/// creation time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub description: String,
    pub owner_id: String,
    pub audio_content_id: Uuid,
    pub cover_content_id: Uuid,
}

/// The mutable subset of a record. Updates overwrite all four fields.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SongFields {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub description: String,
}
