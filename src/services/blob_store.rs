//! src/services/blob_store.rs
//!
//! BlobStore: chunked blob storage backed by SQLite for blob and chunk
//! metadata and local disk for chunk payloads. Chunk files are content
//! addressed: each is named by the MD5 of its bytes and sharded beneath
//! `base_path/chunks/{shard}/{shard}/{digest}`, so identical chunks are
//! stored once and shared between blobs.

use crate::models::blob::{BlobHandle, ChunkRef};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::{
    collections::VecDeque,
    future::Future,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
    sync::RwLock,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Chunk size used for new blobs.
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob `{0}` not found")]
    BlobNotFound(Uuid),
    #[error("invalid content id `{0}`")]
    InvalidContentId(String),
    #[error("blob `{blob}` is missing chunk {n} ({digest})")]
    MissingChunk { blob: Uuid, n: i64, digest: String },
    #[error("blob `{blob}` failed its integrity check: expected {expected}, read {actual}")]
    Corrupt {
        blob: Uuid,
        expected: String,
        actual: String,
    },
    #[error("blob store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to decode blob row: {0}")]
    Decode(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(FromRow)]
struct BlobRow {
    id: String,
    filename: String,
    length: i64,
    md5: Option<String>,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<BlobRow> for BlobHandle {
    type Error = StorageError;

    fn try_from(row: BlobRow) -> Result<Self, Self::Error> {
        let content_id = Uuid::parse_str(&row.id)
            .map_err(|err| StorageError::Decode(format!("blob id `{}`: {}", row.id, err)))?;
        Ok(BlobHandle {
            content_id,
            filename: row.filename,
            length: row.length,
            md5: row.md5,
            uploaded_at: row.uploaded_at,
        })
    }
}

#[derive(FromRow)]
struct ChunkRow {
    n: i64,
    digest: String,
    size: i64,
}

/// BlobStore provides streamed, chunked blob storage:
/// - `open_write` hands out a writer bound to a fresh content id
/// - `open_read` hands out a reader over a completed blob
/// - `delete` removes a blob and any chunk files nobody else references
#[derive(Clone)]
pub struct BlobStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where chunk payloads are stored.
    pub base_path: PathBuf,

    chunk_size: usize,
    timeout: Duration,
    /// Writers hold it shared while adding a chunk reference and its file;
    /// the collector holds it exclusively from reference count to unlink.
    chunk_gate: Arc<RwLock<()>>,
}

impl BlobStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
            chunk_gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Bound applied to every metadata round trip and chunk transfer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Parse a content id as received from a caller.
    pub fn parse_content_id(raw: &str) -> StorageResult<Uuid> {
        Uuid::parse_str(raw.trim()).map_err(|_| StorageError::InvalidContentId(raw.to_string()))
    }

    fn chunks_root(&self) -> PathBuf {
        self.base_path.join("chunks")
    }

    /// Two-level shard for a chunk digest, taken from its first two bytes.
    fn chunk_shards(digest: &str) -> (&str, &str) {
        let a = digest.get(0..2).unwrap_or("00");
        let b = digest.get(2..4).unwrap_or("00");
        (a, b)
    }

    fn chunk_path(&self, digest: &str) -> PathBuf {
        chunk_path(&self.chunks_root(), digest)
    }

    async fn bounded<T, F>(&self, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))?
    }

    /// Start a new blob named `filename`. The blob stays invisible to
    /// readers until the writer is closed.
    pub async fn open_write(&self, filename: &str) -> StorageResult<BlobWriter> {
        let id = Uuid::new_v4();
        self.bounded(async {
            sqlx::query(
                "INSERT INTO blobs (id, filename, length, chunk_size, md5, uploaded_at, complete)
                 VALUES (?, ?, 0, ?, NULL, ?, 0)",
            )
            .bind(id.to_string())
            .bind(filename)
            .bind(self.chunk_size as i64)
            .bind(Utc::now())
            .execute(&*self.db)
            .await?;
            Ok(())
        })
        .await?;

        debug!(content_id = %id, filename, "opened blob for write");
        Ok(BlobWriter {
            store: self.clone(),
            id,
            filename: filename.to_string(),
            buffer: BytesMut::with_capacity(self.chunk_size),
            next_chunk: 0,
            length: 0,
            digest: md5::Context::new(),
            finished: false,
        })
    }

    /// Open a completed blob for sequential reading.
    pub async fn open_read(&self, content_id: Uuid) -> StorageResult<BlobReader> {
        let handle = self.stat(content_id).await?;
        let chunks = self
            .bounded(async {
                let rows = sqlx::query_as::<_, ChunkRow>(
                    "SELECT n, digest, size FROM blob_chunks WHERE blob_id = ? ORDER BY n ASC",
                )
                .bind(content_id.to_string())
                .fetch_all(&*self.db)
                .await?;
                Ok(rows)
            })
            .await?
            .into_iter()
            .map(|row| ChunkRef {
                n: row.n,
                digest: row.digest,
                size: row.size,
            })
            .collect::<VecDeque<_>>();

        debug!(content_id = %content_id, chunks = chunks.len(), "opened blob for read");
        Ok(BlobReader {
            handle,
            chunks,
            chunks_root: self.chunks_root(),
            current: None,
            digest: Some(md5::Context::new()),
        })
    }

    /// Metadata of a completed blob.
    pub async fn stat(&self, content_id: Uuid) -> StorageResult<BlobHandle> {
        let row = self
            .bounded(async {
                let row = sqlx::query_as::<_, BlobRow>(
                    "SELECT id, filename, length, md5, uploaded_at
                     FROM blobs WHERE id = ? AND complete = 1",
                )
                .bind(content_id.to_string())
                .fetch_optional(&*self.db)
                .await?;
                Ok(row)
            })
            .await?;
        row.ok_or(StorageError::BlobNotFound(content_id))?
            .try_into()
    }

    /// Remove a blob. Chunk files still referenced by other blobs stay.
    pub async fn delete(&self, content_id: Uuid) -> StorageResult<()> {
        if self.discard(content_id).await? == 0 {
            return Err(StorageError::BlobNotFound(content_id));
        }
        debug!(content_id = %content_id, "deleted blob");
        Ok(())
    }

    /// `SELECT 1` against the metadata database.
    pub async fn ping_database(&self) -> Result<(), String> {
        match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await
        {
            Ok(1) => Ok(()),
            Ok(v) => Err(format!("unexpected result: {}", v)),
            Err(e) => Err(format!("error: {}", e)),
        }
    }

    /// Write, read back and remove a scratch file under `base_path`.
    pub async fn ping_disk(&self) -> Result<(), String> {
        let marker = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        let result = match fs::write(&marker, b"readyz").await {
            Ok(()) => match fs::read(&marker).await {
                Ok(bytes) if bytes == b"readyz" => Ok(()),
                Ok(_) => Err("file content mismatch".to_string()),
                Err(e) => Err(format!("could not read readiness marker: {}", e)),
            },
            Err(e) => return Err(format!("could not write readiness marker: {}", e)),
        };
        if let Err(e) = fs::remove_file(&marker).await {
            warn!(path = %marker.display(), error = %e, "could not remove readiness marker");
        }
        result
    }

    /// Drop the metadata of a blob, finished or not, then collect chunk
    /// files left without a reference. Returns the number of blob rows
    /// removed.
    async fn discard(&self, content_id: Uuid) -> StorageResult<u64> {
        let id = content_id.to_string();
        let (removed, digests) = self
            .bounded(async {
                let mut tx = self.db.begin().await?;
                let digests: Vec<String> = sqlx::query_scalar(
                    "SELECT DISTINCT digest FROM blob_chunks WHERE blob_id = ?",
                )
                .bind(&id)
                .fetch_all(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM blob_chunks WHERE blob_id = ?")
                    .bind(&id)
                    .execute(&mut *tx)
                    .await?;
                let removed = sqlx::query("DELETE FROM blobs WHERE id = ?")
                    .bind(&id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                tx.commit().await?;
                Ok((removed, digests))
            })
            .await?;

        self.collect_garbage(digests).await;
        Ok(removed)
    }

    /// Remove chunk files whose digest no blob references anymore.
    /// Failures are logged; an unreferenced chunk file is only wasted space.
    async fn collect_garbage(&self, digests: Vec<String>) {
        let chunks_root = self.chunks_root();
        for digest in digests {
            let _gate = self.chunk_gate.write().await;
            let references = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM blob_chunks WHERE digest = ?",
            )
            .bind(&digest)
            .fetch_one(&*self.db)
            .await;

            match references {
                Ok(0) => {}
                Ok(_) => continue,
                Err(err) => {
                    warn!(digest, error = %err, "could not count chunk references; keeping file");
                    continue;
                }
            }

            let path = self.chunk_path(&digest);
            match fs::remove_file(&path).await {
                Ok(_) => debug!("removed chunk file {}", path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("chunk file {} already missing", path.display());
                }
                Err(err) => {
                    warn!("failed to remove chunk file {}: {}", path.display(), err);
                    continue;
                }
            }
            if let Some(parent) = path.parent() {
                prune_empty_dirs(parent, &chunks_root).await;
            }
        }
    }

    /// Persist one chunk file unless an identical one already exists.
    ///
    /// Writes to a temp file, fsyncs, then renames into place so readers
    /// never observe a partial chunk.
    async fn write_chunk_file(&self, digest: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.chunk_path(digest);
        if fs::try_exists(&path).await? {
            return Ok(());
        }
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "chunk path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        Ok(())
    }
}

fn chunk_path(chunks_root: &Path, digest: &str) -> PathBuf {
    let (shard_a, shard_b) = BlobStore::chunk_shards(digest);
    let mut path = chunks_root.to_path_buf();
    path.push(shard_a);
    path.push(shard_b);
    path.push(digest);
    path
}

/// Recursively remove empty directories up to the chunk root.
///
/// Stops when:
/// - directory not empty
/// - directory not found
/// - reached root
/// - encountered unexpected I/O errors
async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        match fs::remove_dir(&current).await {
            Ok(_) => {
                if let Some(parent) = current.parent() {
                    current = parent.to_path_buf();
                } else {
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
            Err(err) => {
                debug!("failed to prune directory {}: {}", current.display(), err);
                break;
            }
        }
    }
}

/// Streaming write handle for one blob.
///
/// Bytes are buffered into fixed-size chunks and persisted as each chunk
/// fills. Finish with [`close`](Self::close) or [`abort`](Self::abort); a
/// writer dropped without either schedules its own abort so no half-written
/// blob outlives it.
pub struct BlobWriter {
    store: BlobStore,
    id: Uuid,
    filename: String,
    buffer: BytesMut,
    next_chunk: i64,
    length: i64,
    digest: md5::Context,
    finished: bool,
}

impl BlobWriter {
    pub fn content_id(&self) -> Uuid {
        self.id
    }

    pub async fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        self.buffer.extend_from_slice(data);
        self.length += data.len() as i64;
        self.digest.consume(data);

        while self.buffer.len() >= self.store.chunk_size {
            let chunk = self.buffer.split_to(self.store.chunk_size).freeze();
            self.flush_chunk(chunk).await?;
        }
        Ok(())
    }

    async fn flush_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        let digest = format!("{:x}", md5::compute(&chunk));
        let store = self.store.clone();
        let blob_id = self.id.to_string();
        let n = self.next_chunk;

        // Reference first, file second, both under the shared gate so the
        // collector cannot unlink a file between the existence check and
        // the reference becoming visible.
        let _gate = store.chunk_gate.read().await;
        store
            .bounded(async {
                sqlx::query(
                    "INSERT INTO blob_chunks (blob_id, n, digest, size) VALUES (?, ?, ?, ?)",
                )
                .bind(&blob_id)
                .bind(n)
                .bind(&digest)
                .bind(chunk.len() as i64)
                .execute(&*store.db)
                .await?;
                store.write_chunk_file(&digest, &chunk).await
            })
            .await?;

        self.next_chunk += 1;
        Ok(())
    }

    /// Flush the tail chunk and publish the blob. On failure the partial
    /// blob is discarded before the error is returned.
    pub async fn close(mut self) -> StorageResult<BlobHandle> {
        let result = self.finish().await;
        self.finished = true;
        match result {
            Ok(handle) => {
                debug!(content_id = %handle.content_id, length = handle.length, "closed blob");
                Ok(handle)
            }
            Err(err) => {
                if let Err(cleanup) = self.store.discard(self.id).await {
                    warn!(content_id = %self.id, error = %cleanup, "failed to discard blob after close error");
                }
                Err(err)
            }
        }
    }

    async fn finish(&mut self) -> StorageResult<BlobHandle> {
        if !self.buffer.is_empty() {
            let tail = self.buffer.split().freeze();
            self.flush_chunk(tail).await?;
        }

        let md5 = format!(
            "{:x}",
            std::mem::replace(&mut self.digest, md5::Context::new()).compute()
        );
        let uploaded_at = Utc::now();
        let store = &self.store;
        let id = self.id;
        let length = self.length;
        let checksum = md5.clone();

        store
            .bounded(async {
                sqlx::query(
                    "UPDATE blobs SET length = ?, md5 = ?, uploaded_at = ?, complete = 1
                     WHERE id = ?",
                )
                .bind(length)
                .bind(&checksum)
                .bind(uploaded_at)
                .bind(id.to_string())
                .execute(&*store.db)
                .await?;
                Ok(())
            })
            .await?;

        Ok(BlobHandle {
            content_id: self.id,
            filename: self.filename.clone(),
            length: self.length,
            md5: Some(md5),
            uploaded_at,
        })
    }

    /// Give up on the blob and release everything written so far.
    pub async fn abort(mut self) -> StorageResult<()> {
        self.finished = true;
        self.store.discard(self.id).await?;
        debug!(content_id = %self.id, "aborted blob write");
        Ok(())
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let store = self.store.clone();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    match store.discard(id).await {
                        Ok(_) => debug!(content_id = %id, "discarded abandoned blob write"),
                        Err(err) => {
                            warn!(content_id = %id, error = %err, "failed to discard abandoned blob write")
                        }
                    }
                });
            }
            Err(_) => warn!(content_id = %id, "blob writer dropped outside a runtime; upload left incomplete"),
        }
    }
}

/// Sequential read handle over a completed blob.
///
/// Chunk files are opened one at a time and closed as soon as they are
/// exhausted; dropping the reader releases whatever is still open. The
/// whole-blob MD5 is checked once the last byte has been read.
pub struct BlobReader {
    handle: BlobHandle,
    chunks: VecDeque<ChunkRef>,
    chunks_root: PathBuf,
    current: Option<File>,
    digest: Option<md5::Context>,
}

impl BlobReader {
    pub fn handle(&self) -> &BlobHandle {
        &self.handle
    }

    /// Read up to `buf.len()` bytes. Returns 0 at end of blob.
    pub async fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.current.is_none() {
                let Some(chunk) = self.chunks.pop_front() else {
                    self.verify()?;
                    return Ok(0);
                };
                self.current = Some(self.open_chunk(&chunk).await?);
            }
            let Some(file) = self.current.as_mut() else {
                continue;
            };

            let n = file.read(buf).await?;
            if n == 0 {
                self.current = None;
                continue;
            }
            if let Some(digest) = self.digest.as_mut() {
                digest.consume(&buf[..n]);
            }
            return Ok(n);
        }
    }

    /// Fill `buf` completely unless the blob ends first.
    pub async fn read_full(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    async fn open_chunk(&self, chunk: &ChunkRef) -> StorageResult<File> {
        let path = chunk_path(&self.chunks_root, &chunk.digest);
        File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::MissingChunk {
                    blob: self.handle.content_id,
                    n: chunk.n,
                    digest: chunk.digest.clone(),
                }
            } else {
                StorageError::Io(err)
            }
        })
    }

    fn verify(&mut self) -> StorageResult<()> {
        let Some(digest) = self.digest.take() else {
            return Ok(());
        };
        let actual = format!("{:x}", digest.compute());
        match self.handle.md5.as_deref() {
            Some(expected) if expected != actual => Err(StorageError::Corrupt {
                blob: self.handle.content_id,
                expected: expected.to_string(),
                actual,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn store(chunk_size: usize) -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_in_memory().await.unwrap();
        let store = BlobStore::new(Arc::new(pool), dir.path()).with_chunk_size(chunk_size);
        (dir, store)
    }

    async fn put(store: &BlobStore, name: &str, data: &[u8]) -> BlobHandle {
        let mut writer = store.open_write(name).await.unwrap();
        for piece in data.chunks(7) {
            writer.write(piece).await.unwrap();
        }
        writer.close().await.unwrap()
    }

    async fn read_all(store: &BlobStore, id: Uuid) -> StorageResult<Vec<u8>> {
        let mut reader = store.open_read(id).await?;
        let mut out = Vec::new();
        let mut buf = [0u8; 5];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    async fn chunk_files(store: &BlobStore) -> usize {
        let mut count = 0;
        let mut pending = vec![store.chunks_root()];
        while let Some(dir) = pending.pop() {
            let Ok(mut entries) = fs::read_dir(&dir).await else {
                continue;
            };
            while let Some(entry) = entries.next_entry().await.unwrap() {
                if entry.file_type().await.unwrap().is_dir() {
                    pending.push(entry.path());
                } else {
                    count += 1;
                }
            }
        }
        count
    }

    #[tokio::test]
    async fn multi_chunk_blob_reads_back_exactly() {
        let (_dir, store) = store(16).await;
        let data: Vec<u8> = (0..100u8).collect();

        let handle = put(&store, "track", &data).await;
        assert_eq!(handle.length, 100);
        assert_eq!(handle.filename, "track");
        assert_eq!(handle.md5.as_deref(), Some(format!("{:x}", md5::compute(&data)).as_str()));

        assert_eq!(read_all(&store, handle.content_id).await.unwrap(), data);
        assert_eq!(chunk_files(&store).await, 7);
    }

    #[tokio::test]
    async fn empty_blob_is_valid() {
        let (_dir, store) = store(16).await;
        let handle = put(&store, "silence", b"").await;
        assert_eq!(handle.length, 0);
        assert!(read_all(&store, handle.content_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unfinished_blob_is_invisible() {
        let (_dir, store) = store(4).await;
        let mut writer = store.open_write("partial").await.unwrap();
        writer.write(b"abcdefgh").await.unwrap();
        let id = writer.content_id();

        assert!(matches!(
            store.open_read(id).await,
            Err(StorageError::BlobNotFound(missing)) if missing == id
        ));
        writer.abort().await.unwrap();
        assert_eq!(chunk_files(&store).await, 0);
    }

    #[tokio::test]
    async fn dropped_writer_discards_itself() {
        let (_dir, store) = store(4).await;
        {
            let mut writer = store.open_write("abandoned").await.unwrap();
            writer.write(b"abcdefgh").await.unwrap();
        }

        for _ in 0..50 {
            let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blobs")
                .fetch_one(&*store.db)
                .await
                .unwrap();
            if rows == 0 && chunk_files(&store).await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("abandoned blob write was not discarded");
    }

    #[tokio::test]
    async fn shared_chunks_survive_deleting_one_owner() {
        let (_dir, store) = store(4).await;
        let a = put(&store, "a", b"samesame").await;
        let b = put(&store, "b", b"samesame").await;
        assert_ne!(a.content_id, b.content_id);
        assert_eq!(chunk_files(&store).await, 1);

        store.delete(a.content_id).await.unwrap();
        assert_eq!(read_all(&store, b.content_id).await.unwrap(), b"samesame");

        store.delete(b.content_id).await.unwrap();
        assert_eq!(chunk_files(&store).await, 0);
    }

    #[tokio::test]
    async fn chunks_shared_with_a_concurrent_delete_stay_readable() {
        let (_dir, store) = store(4).await;
        for round in 0..50 {
            let doomed = put(&store, "old", b"shared-bytes").await;
            let (deleted, fresh) = tokio::join!(
                store.delete(doomed.content_id),
                put(&store, "new", b"shared-bytes"),
            );
            deleted.unwrap();
            assert_eq!(
                read_all(&store, fresh.content_id).await.unwrap(),
                b"shared-bytes",
                "round {round}"
            );
            store.delete(fresh.content_id).await.unwrap();
        }
        assert_eq!(chunk_files(&store).await, 0);
    }

    #[tokio::test]
    async fn deleting_unknown_blob_reports_not_found() {
        let (_dir, store) = store(4).await;
        let id = Uuid::new_v4();
        assert!(matches!(
            store.delete(id).await,
            Err(StorageError::BlobNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn missing_chunk_file_is_reported() {
        let (_dir, store) = store(4).await;
        let handle = put(&store, "x", b"abcd").await;
        let digest = format!("{:x}", md5::compute(b"abcd"));
        fs::remove_file(store.chunk_path(&digest)).await.unwrap();

        assert!(matches!(
            read_all(&store, handle.content_id).await,
            Err(StorageError::MissingChunk { n: 0, .. })
        ));
    }

    #[tokio::test]
    async fn tampered_chunk_fails_integrity_check() {
        let (_dir, store) = store(4).await;
        let handle = put(&store, "x", b"abcd").await;
        let digest = format!("{:x}", md5::compute(b"abcd"));
        fs::write(store.chunk_path(&digest), b"abce").await.unwrap();

        assert!(matches!(
            read_all(&store, handle.content_id).await,
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn readiness_checks_pass_on_a_healthy_store() {
        let (dir, store) = store(8).await;
        assert_eq!(store.ping_database().await, Ok(()));
        assert_eq!(store.ping_disk().await, Ok(()));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn content_ids_are_validated() {
        assert!(BlobStore::parse_content_id("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(BlobStore::parse_content_id(&id.to_string()).unwrap(), id);
    }
}
