//! Defines routes for the album art endpoints.
//!
//! ## Structure
//! - `GET  /`                     -> status page for the caller's bucket
//! - `POST /`                     -> clear the caller's bucket (bucketed layout only)
//! - `GET  /a/{client}/{*name}`   -> fetch an object from a client's bucket
//! - `GET  /a/{*name}`            -> fetch an object (flat layout)
//! - `POST /upload`               -> multipart upload
//! - `GET  /healthz`, `/readyz`   -> liveness and readiness
//!
//! The wildcard `*name` swallows the rest of the path so traversal attempts
//! reach the sanitizer instead of the router.

use crate::{
    handlers::{
        art_handlers::{clear_bucket, fetch_art, fetch_shared_art, status_page, upload_art},
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the router for either storage layout.
///
/// The request body limit is lifted on `/upload`; the ingestion pipeline
/// enforces its own ceiling while streaming.
pub fn routes(flat: bool) -> Router<AppState> {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/upload",
            post(upload_art).layer(DefaultBodyLimit::disable()),
        );

    let router = if flat {
        router
            .route("/", get(status_page))
            .route("/a/{*name}", get(fetch_shared_art))
    } else {
        router
            .route("/", get(status_page).post(clear_bucket))
            .route("/a/{client}/{*name}", get(fetch_art))
    };

    router.layer(TraceLayer::new_for_http())
}
