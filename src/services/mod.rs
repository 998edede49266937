pub mod auth_service;
pub mod blob_store;
pub mod catalog_service;
pub mod catalog_store;
pub mod ingestion;
pub mod session_store;
pub mod song_rpc;
pub mod streaming;
pub mod users_service;
