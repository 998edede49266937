//! Represents a blob stored as a sequence of content-addressed chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata of one stored blob.
///
/// The content id is fresh per upload; the chunk files behind it are named
/// by the MD5 digest of their bytes and may be shared with other blobs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlobHandle {
    pub content_id: Uuid,

    /// Logical name supplied by the writer (song title, album name).
    pub filename: String,

    /// Total size in bytes.
    pub length: i64,

    /// Hex MD5 of the whole payload, known once the writer is closed.
    pub md5: Option<String>,

    pub uploaded_at: DateTime<Utc>,
}

/// One stored chunk of a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkRef {
    /// Zero-based position within the blob.
    pub n: i64,
    /// Hex MD5 of the chunk bytes; doubles as the chunk file name.
    pub digest: String,
    pub size: i64,
}
