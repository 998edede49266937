//! Songbird: a media catalog backend.
//!
//! Audio and cover art are ingested into a chunked blob store, the
//! describing record is written to the catalog asynchronously over the
//! message bus, and stored blobs are paged back out to callers as
//! fixed-size chunk streams.

pub mod bus;
pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
