#![allow(dead_code)]

use bytes::Bytes;
use futures::TryStreamExt;
use songbird::{
    bus::{MemoryTransport, ResponderHandle},
    config::AppConfig,
    context::AppContext,
    db,
    models::messages::SongList,
    services::{ingestion::UploadSong, song_rpc::SongRpc, streaming::ChunkStream},
};
use std::{sync::Arc, time::Duration};

/// Every role in one process over the in-memory bus, backed by an
/// in-memory database and a scratch blob directory.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub ctx: AppContext,
    pub rpc: SongRpc,
    pub responders: ResponderHandle,
}

impl Harness {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            storage_dir: dir.path().to_string_lossy().into_owned(),
            request_timeout: Duration::from_secs(2),
            ..AppConfig::default()
        };
        let pool = Arc::new(db::connect_in_memory().await.unwrap());
        let ctx = AppContext::new(config, pool, Arc::new(MemoryTransport::new()));
        let ctx = ctx.clone().with_blobs(ctx.blobs.clone().with_chunk_size(64));
        let responders = ctx.serve_responders().await.unwrap();
        let rpc = ctx.song_rpc();
        Self {
            dir,
            ctx,
            rpc,
            responders,
        }
    }

    /// Poll until the owner has `n` records; catalog inserts land
    /// asynchronously after an upload returns.
    pub async fn wait_for_songs(&self, owner_id: &str, n: usize) -> SongList {
        for _ in 0..200 {
            let list = self.rpc.get_user_songs(owner_id).await.unwrap();
            if list.records.len() == n {
                return list;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{owner_id} never reached {n} songs");
    }
}

pub fn upload(owner_id: &str, audio: &[u8], cover: &[u8]) -> UploadSong {
    UploadSong {
        title: "A".into(),
        artist: "B".into(),
        album: "C".into(),
        description: "D".into(),
        owner_id: owner_id.into(),
        audio: Bytes::copy_from_slice(audio),
        cover: Bytes::copy_from_slice(cover),
    }
}

pub fn sample_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

pub async fn collect(stream: ChunkStream) -> Vec<u8> {
    let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
    chunks.concat()
}
