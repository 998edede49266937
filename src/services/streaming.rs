//! Server-streaming read path: a stored blob paged back out in fixed-size
//! chunks.

use crate::services::blob_store::{BlobReader, BlobStore, StorageError, StorageResult};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

/// Bytes per streamed message.
pub const STREAM_CHUNK_SIZE: usize = 4096;

pub type ChunkStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// Page `reader` out in [`STREAM_CHUNK_SIZE`] pieces. Only the last chunk
/// may be shorter. The reader is dropped as soon as the stream ends, fails
/// or is itself dropped by the consumer.
pub fn chunk_stream(reader: BlobReader) -> ChunkStream {
    let content_id = reader.handle().content_id;
    stream::try_unfold(reader, move |mut reader| async move {
        let mut buf = BytesMut::zeroed(STREAM_CHUNK_SIZE);
        let n = reader.read_full(&mut buf).await?;
        if n == 0 {
            debug!(content_id = %content_id, "stream complete");
            return Ok(None);
        }
        buf.truncate(n);
        Ok::<_, StorageError>(Some((buf.freeze(), reader)))
    })
    .inspect(move |item| {
        if let Err(err) = item {
            warn!(content_id = %content_id, error = %err, "stream aborted");
        }
    })
    .boxed()
}

/// Resolve a caller-supplied content id and open it for streaming.
/// Malformed ids fail before any storage is touched.
pub async fn open_chunk_stream(blobs: &BlobStore, raw_id: &str) -> StorageResult<ChunkStream> {
    let content_id = BlobStore::parse_content_id(raw_id)?;
    let reader = blobs.open_read(content_id).await?;
    Ok(chunk_stream(reader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use futures::TryStreamExt;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_in_memory().await.unwrap();
        let store = BlobStore::new(Arc::new(pool), dir.path()).with_chunk_size(1000);
        (dir, store)
    }

    async fn put(store: &BlobStore, data: &[u8]) -> Uuid {
        let mut writer = store.open_write("blob").await.unwrap();
        writer.write(data).await.unwrap();
        writer.close().await.unwrap().content_id
    }

    #[tokio::test]
    async fn streams_fixed_size_chunks_with_a_short_tail() {
        let (_dir, store) = store().await;
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let id = put(&store, &data).await;

        let chunks: Vec<Bytes> = open_chunk_stream(&store, &id.to_string())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let sizes: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![4096, 4096, 1808]);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn empty_blob_streams_nothing() {
        let (_dir, store) = store().await;
        let id = put(&store, b"").await;
        let chunks: Vec<Bytes> = open_chunk_stream(&store, &id.to_string())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn malformed_and_unknown_ids_fail_before_streaming() {
        let (_dir, store) = store().await;
        assert!(matches!(
            open_chunk_stream(&store, "not-a-uuid").await,
            Err(StorageError::InvalidContentId(_))
        ));
        assert!(matches!(
            open_chunk_stream(&store, &Uuid::new_v4().to_string()).await,
            Err(StorageError::BlobNotFound(_))
        ));
    }
}
