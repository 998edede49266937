//! Everything a service needs, built once at startup and handed out by
//! reference.

use crate::{
    bus::{Bridge, MemoryTransport, NatsTransport, ResponderHandle, Transport, TransportError},
    config::{AppConfig, BusKind},
    services::{
        auth_service::AuthService,
        blob_store::BlobStore,
        catalog_service::CatalogService,
        catalog_store::{CatalogStore, SqliteCatalogStore},
        session_store::SessionStore,
        song_rpc::SongRpc,
        users_service::UsersService,
    },
};
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub db: Arc<SqlitePool>,
    pub transport: Arc<dyn Transport>,
    pub bridge: Bridge,
    pub blobs: BlobStore,
    pub catalog: Arc<dyn CatalogStore>,
    pub sessions: SessionStore,
}

impl AppContext {
    pub fn new(config: AppConfig, db: Arc<SqlitePool>, transport: Arc<dyn Transport>) -> Self {
        let blobs = BlobStore::new(db.clone(), config.storage_dir.clone())
            .with_timeout(config.store_timeout);
        let catalog: Arc<dyn CatalogStore> =
            Arc::new(SqliteCatalogStore::new(db.clone()).with_timeout(config.store_timeout));
        Self {
            bridge: Bridge::new(transport.clone()),
            sessions: SessionStore::new(db.clone()),
            config,
            db,
            transport,
            blobs,
            catalog,
        }
    }

    /// Open the bus selected by `config.bus`.
    pub async fn connect_bus(config: &AppConfig) -> Result<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> = match config.bus {
            BusKind::Memory => Arc::new(MemoryTransport::new()),
            BusKind::Nats => {
                let name = format!("songbird-{:?}", config.role).to_lowercase();
                let transport = NatsTransport::connect(&config.nats_url, &name)
                    .await
                    .with_context(|| format!("connecting to NATS at {}", config.nats_url))?;
                Arc::new(transport)
            }
        };
        Ok(transport)
    }

    /// Replace the catalog store, e.g. with a test double.
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogStore>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_blobs(mut self, blobs: BlobStore) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn song_rpc(&self) -> SongRpc {
        SongRpc::new(
            self.blobs.clone(),
            self.bridge.clone(),
            self.config.request_timeout,
            self.config.max_message_bytes,
        )
    }

    /// Subscribe every responder this process's role owns.
    pub async fn serve_responders(&self) -> Result<ResponderHandle, TransportError> {
        let role = self.config.role;
        let mut handle = ResponderHandle::default();

        if role.runs_users() {
            let users = Arc::new(UsersService::new(self.db.clone()));
            handle.merge(users.responder(self.transport.clone()).serve().await?);
        }
        if role.runs_catalog() {
            let catalog = Arc::new(CatalogService::new(self.catalog.clone()));
            handle.merge(catalog.responder(self.transport.clone()).serve().await?);
        }
        if role.runs_auth() {
            let auth = Arc::new(AuthService::new(
                self.bridge.clone(),
                self.sessions.clone(),
                self.config.request_timeout,
            ));
            handle.merge(auth.responder().serve().await?);
        }
        Ok(handle)
    }
}
