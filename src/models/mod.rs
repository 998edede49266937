//! Core data models for the song catalog.
//!
//! Catalog records and blob handles are decoded from SQLite rows once at
//! the store boundary; everything that crosses the bus or the RPC surface
//! serializes as camelCase JSON via `serde`.

pub mod blob;
pub mod messages;
pub mod song;
pub mod user;
