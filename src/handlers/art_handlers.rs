//! HTTP handlers for the album art endpoints.
//! Uploads stream straight into the ingestion pipeline and fetches stream
//! files back out without buffering.

use crate::{
    errors::AppError,
    handlers::pages::{self, ClearPage},
    models::{client::ClientId, object::ObjectName},
    services::object_store::ObjectStore,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{ConnectInfo, Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use std::net::SocketAddr;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

/// Resolve the requesting client's bucket, or `None` in the flat layout.
fn resolve_client(
    state: &AppState,
    peer: SocketAddr,
    headers: &HeaderMap,
) -> Result<Option<ClientId>, AppError> {
    if state.config.flat {
        return Ok(None);
    }
    let client = ClientId::resolve(peer.ip(), headers, state.config.forwarded_header.as_deref())?;
    Ok(Some(client))
}

/// `GET /`: object count and listing for the caller's bucket.
pub async fn status_page(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Html<String>, AppError> {
    let client = resolve_client(&state, peer, &headers)?;
    let entries = state.store.list(client.as_ref()).await?;

    let domain = &state.config.domain;
    let owner = client
        .as_ref()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "everyone".into());
    let html = pages::status(
        &owner,
        &entries,
        |name| match &client {
            Some(c) => format!("{}/a/{}/{}", domain, c, name),
            None => format!("{}/a/{}", domain, name),
        },
        client.is_some(),
    );
    Ok(Html(html))
}

/// `POST /`: wipe the caller's bucket.
///
/// Always answers 200; the outcome is carried by the page text.
pub async fn clear_bucket(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Html<String>, AppError> {
    let client = ClientId::resolve(
        peer.ip(),
        &headers,
        state.config.forwarded_header.as_deref(),
    )?;

    let page = match state.store.clear(&client).await {
        Ok(outcome) => outcome.into(),
        Err(err) => {
            warn!("clearing bucket {} failed: {}", client, err);
            ClearPage::Failed
        }
    };
    Ok(Html(pages::clear(page)))
}

/// `GET /a/{client}/{*name}`: public fetch from any client's bucket.
pub async fn fetch_art(
    State(state): State<AppState>,
    Path((client, name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let client = ClientId::parse_untrusted(&client)?;
    serve_object(&state.store, Some(&client), &name).await
}

/// `GET /a/{*name}`: fetch from the shared directory (flat layout).
pub async fn fetch_shared_art(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    serve_object(&state.store, None, &name).await
}

async fn serve_object(
    store: &ObjectStore,
    client: Option<&ClientId>,
    raw_name: &str,
) -> Result<Response, AppError> {
    let name = ObjectName::sanitize(raw_name)
        .ok_or_else(|| AppError::not_found(format!("object `{}` not found", raw_name)))?;
    let (file, len) = store.get(client, &name).await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let mime = mime_guess::from_path(name.as_str()).first_or_octet_stream();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}

/// `POST /upload`: multipart upload; answers with the object's public URL.
pub async fn upload_art(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let client = resolve_client(&state, peer, &headers)?;
    let receipt = state.ingest.ingest(client.as_ref(), &mut multipart).await?;

    info!(
        "upload from {} stored as {} ({} bytes, existed: {})",
        peer.ip(),
        receipt.name,
        receipt.size_bytes,
        receipt.already_existed
    );
    Ok(receipt.public_url(&state.config.domain))
}
