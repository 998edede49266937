//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness of the metadata database and blob directory

use crate::services::song_rpc::SongRpc;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Liveness check. Always 200 with `{"status":"ok"}`; never touches I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness check over the gateway's own stores:
/// 1. A lightweight query against SQLite (`SELECT 1`).
/// 2. A write/read/delete of a scratch file under the blob directory.
///
/// HTTP 200 when all checks pass, HTTP 503 when any check fails.
pub async fn readyz(State(rpc): State<SongRpc>) -> impl IntoResponse {
    let blobs = rpc.blobs();
    let sqlite = blobs.ping_database().await;
    let disk = blobs.ping_disk().await;
    let overall_ok = sqlite.is_ok() && disk.is_ok();

    let mut checks = HashMap::new();
    checks.insert("sqlite", CheckStatus::from(sqlite));
    checks.insert("disk", CheckStatus::from(disk));

    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl From<Result<(), String>> for CheckStatus {
    fn from(result: Result<(), String>) -> Self {
        Self {
            ok: result.is_ok(),
            error: result.err(),
        }
    }
}
