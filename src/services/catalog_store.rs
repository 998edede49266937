//! Catalog store: structured song records in the `songs` table.

use crate::models::song::{NewSong, Song, SongFields};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::{FromRow, SqlitePool};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid song id `{0}`")]
    InvalidId(String),
    #[error("failed to decode song record: {0}")]
    Decode(String),
    #[error("catalog store timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}

/// Parse a record id as received from a caller into the store's key type.
pub fn parse_song_id(raw: &str) -> CatalogResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| CatalogError::InvalidId(raw.to_string()))
}

/// CRUD over catalog records.
///
/// Queries return fully materialized vectors; an empty vector means
/// nothing matched and is never used to signal a failure.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a record and return the id the store assigned to it.
    async fn insert(&self, song: NewSong) -> CatalogResult<Uuid>;

    async fn find_by_owner(&self, owner_id: &str) -> CatalogResult<Vec<Song>>;

    async fn find_all(&self) -> CatalogResult<Vec<Song>>;

    /// Overwrite the descriptive fields. Content ids are never touched.
    async fn update(&self, id: Uuid, fields: SongFields) -> CatalogResult<UpdateOutcome>;

    /// Returns the number of records deleted (0 or 1).
    async fn delete_by_id(&self, id: Uuid) -> CatalogResult<u64>;
}

#[derive(FromRow)]
struct SongRow {
    id: String,
    title: String,
    artist: String,
    album: String,
    description: String,
    owner_id: String,
    audio_content_id: String,
    cover_content_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SongRow> for Song {
    type Error = CatalogError;

    fn try_from(row: SongRow) -> Result<Self, Self::Error> {
        let uuid = |field: &str, value: &str| {
            Uuid::parse_str(value)
                .map_err(|err| CatalogError::Decode(format!("{} `{}`: {}", field, value, err)))
        };
        Ok(Song {
            id: uuid("id", &row.id)?,
            audio_content_id: uuid("audio_content_id", &row.audio_content_id)?,
            cover_content_id: uuid("cover_content_id", &row.cover_content_id)?,
            title: row.title,
            artist: row.artist,
            album: row.album,
            description: row.description,
            owner_id: row.owner_id,
            created_at: row.created_at,
        })
    }
}

const SELECT_SONGS: &str = "SELECT id, title, artist, album, description, owner_id, \
     audio_content_id, cover_content_id, created_at FROM songs";

#[derive(Clone)]
pub struct SqliteCatalogStore {
    db: Arc<SqlitePool>,
    timeout: Duration,
}

impl SqliteCatalogStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self {
            db,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T, F>(&self, fut: F) -> CatalogResult<T>
    where
        F: Future<Output = CatalogResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| CatalogError::Timeout(self.timeout))?
    }

    /// Drain a query cursor, decoding each row as it arrives.
    async fn collect(&self, sql: &str, owner_id: Option<&str>) -> CatalogResult<Vec<Song>> {
        self.bounded(async {
            let mut query = sqlx::query_as::<_, SongRow>(sql);
            if let Some(owner_id) = owner_id {
                query = query.bind(owner_id);
            }
            let mut rows = query.fetch(&*self.db);
            let mut songs = Vec::new();
            while let Some(row) = rows.try_next().await? {
                songs.push(Song::try_from(row)?);
            }
            Ok(songs)
        })
        .await
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn insert(&self, song: NewSong) -> CatalogResult<Uuid> {
        let id = Uuid::new_v4();
        self.bounded(async {
            sqlx::query(
                "INSERT INTO songs (id, title, artist, album, description, owner_id,
                                    audio_content_id, cover_content_id, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id.to_string())
            .bind(&song.title)
            .bind(&song.artist)
            .bind(&song.album)
            .bind(&song.description)
            .bind(&song.owner_id)
            .bind(song.audio_content_id.to_string())
            .bind(song.cover_content_id.to_string())
            .bind(Utc::now())
            .execute(&*self.db)
            .await?;
            Ok(())
        })
        .await?;
        debug!(record_id = %id, owner_id = %song.owner_id, "inserted song");
        Ok(id)
    }

    async fn find_by_owner(&self, owner_id: &str) -> CatalogResult<Vec<Song>> {
        let sql = format!("{} WHERE owner_id = ? ORDER BY created_at ASC, id ASC", SELECT_SONGS);
        self.collect(&sql, Some(owner_id)).await
    }

    async fn find_all(&self) -> CatalogResult<Vec<Song>> {
        let sql = format!("{} ORDER BY created_at ASC, id ASC", SELECT_SONGS);
        self.collect(&sql, None).await
    }

    async fn update(&self, id: Uuid, fields: SongFields) -> CatalogResult<UpdateOutcome> {
        let affected = self
            .bounded(async {
                let result = sqlx::query(
                    "UPDATE songs SET title = ?, artist = ?, album = ?, description = ?
                     WHERE id = ?",
                )
                .bind(&fields.title)
                .bind(&fields.artist)
                .bind(&fields.album)
                .bind(&fields.description)
                .bind(id.to_string())
                .execute(&*self.db)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;

        Ok(if affected == 0 {
            UpdateOutcome::NotFound
        } else {
            UpdateOutcome::Updated
        })
    }

    async fn delete_by_id(&self, id: Uuid) -> CatalogResult<u64> {
        self.bounded(async {
            let result = sqlx::query("DELETE FROM songs WHERE id = ?")
                .bind(id.to_string())
                .execute(&*self.db)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}
