//! Upload ingestion: streams a multipart `thumb` part into a staged file,
//! enforces the size ceiling while bytes arrive, and only then publishes the
//! result in the object store.

use crate::{
    models::{client::ClientId, object::ObjectName},
    services::object_store::{ObjectStore, StagedObject, StoreError},
};
use axum::extract::{
    Multipart,
    multipart::{Field, MultipartError},
};
use thiserror::Error;
use tracing::{debug, warn};

/// Album art is small; anything past 5 MiB is treated as abuse.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Multipart part carrying the image bytes.
pub const THUMB_FIELD: &str = "thumb";
/// Optional form field overriding the object name (required in flat mode).
pub const ID_FIELD: &str = "id";
/// Most bytes accepted for the `id` field.
pub const MAX_ID_FIELD_BYTES: usize = 1024;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing `{0}` field")]
    MissingField(&'static str),
    #[error("duplicate `{0}` field")]
    DuplicateField(&'static str),
    #[error("uploaded file has no filename")]
    MissingFilename,
    #[error("upload name is empty after sanitization")]
    InvalidName,
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("`{field}` field exceeds the {limit} byte limit")]
    FieldTooLarge { field: &'static str, limit: usize },
    #[error("`{0}` field is not valid UTF-8")]
    InvalidField(&'static str),
    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a finished upload ended up.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub client: Option<ClientId>,
    pub name: ObjectName,
    pub size_bytes: u64,
    pub already_existed: bool,
}

impl UploadReceipt {
    /// Public URL of the object under `base_domain`.
    pub fn public_url(&self, base_domain: &str) -> String {
        match &self.client {
            Some(client) => format!("{}/a/{}/{}", base_domain, client, self.name),
            None => format!("{}/a/{}", base_domain, self.name),
        }
    }
}

/// Bytes received so far for one upload, bounded by `limit`.
#[derive(Debug)]
pub struct IncomingUpload {
    staged: StagedObject,
    received: u64,
    limit: u64,
}

impl IncomingUpload {
    /// Append a chunk, failing once the running total passes the limit.
    /// Nothing beyond the limit is ever written.
    pub async fn push(&mut self, chunk: &[u8]) -> Result<(), IngestError> {
        self.received += chunk.len() as u64;
        if self.received > self.limit {
            return Err(IngestError::TooLarge { limit: self.limit });
        }
        self.staged
            .write_chunk(chunk)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

#[derive(Clone, Debug)]
pub struct IngestPipeline {
    store: ObjectStore,
    max_bytes: u64,
    flat: bool,
}

impl IngestPipeline {
    pub fn new(store: ObjectStore, max_bytes: u64, flat: bool) -> Self {
        Self {
            store,
            max_bytes,
            flat,
        }
    }

    /// Start receiving an upload for `client`.
    pub async fn begin(&self, client: Option<&ClientId>) -> Result<IncomingUpload, IngestError> {
        Ok(IncomingUpload {
            staged: self.store.stage(client).await?,
            received: 0,
            limit: self.max_bytes,
        })
    }

    /// Commit a fully received upload under the sanitized form of `raw_name`.
    /// An object that already exists still counts as success.
    pub async fn finish(
        &self,
        client: Option<&ClientId>,
        upload: IncomingUpload,
        raw_name: &str,
    ) -> Result<UploadReceipt, IngestError> {
        let name = ObjectName::sanitize(raw_name).ok_or(IngestError::InvalidName)?;
        let size_bytes = upload.received;
        let already_existed = self.store.commit(upload.staged, &name).await?;

        Ok(UploadReceipt {
            client: client.cloned(),
            name,
            size_bytes,
            already_existed,
        })
    }

    /// Drive a whole multipart upload.
    ///
    /// Fields may arrive in any order. The `thumb` part is streamed to disk as
    /// it arrives; the name comes from `id` when given, otherwise from the
    /// part's filename. In flat mode `id` and a non-blank filename are both
    /// required. Any error drops the staged file, so nothing is committed.
    pub async fn ingest(
        &self,
        client: Option<&ClientId>,
        multipart: &mut Multipart,
    ) -> Result<UploadReceipt, IngestError> {
        let mut upload: Option<(IncomingUpload, Option<String>)> = None;
        let mut id_field: Option<String> = None;

        while let Some(mut field) = multipart.next_field().await? {
            let field_name = field.name().unwrap_or_default().to_string();
            match field_name.as_str() {
                THUMB_FIELD => {
                    if upload.is_some() {
                        return Err(IngestError::DuplicateField(THUMB_FIELD));
                    }
                    let filename = field.file_name().map(String::from);
                    let mut incoming = self.begin(client).await?;
                    while let Some(chunk) = field.chunk().await? {
                        if let Err(err) = incoming.push(&chunk).await {
                            warn!(
                                "aborting upload from {:?} after {} bytes: {}",
                                client.map(ClientId::as_str),
                                incoming.received(),
                                err
                            );
                            return Err(err);
                        }
                    }
                    upload = Some((incoming, filename));
                }
                ID_FIELD => id_field = Some(read_text_field(&mut field, ID_FIELD).await?),
                other => debug!("skipping unexpected upload field `{}`", other),
            }
        }

        let (incoming, filename) = upload.ok_or(IngestError::MissingField(THUMB_FIELD))?;
        let raw_name = if self.flat {
            if filename.as_deref().is_none_or(|f| f.trim().is_empty()) {
                return Err(IngestError::MissingFilename);
            }
            id_field.ok_or(IngestError::MissingField(ID_FIELD))?
        } else {
            id_field
                .or(filename)
                .ok_or(IngestError::InvalidName)?
        };

        self.finish(client, incoming, &raw_name).await
    }
}

/// Read a small text field without buffering more than [`MAX_ID_FIELD_BYTES`].
async fn read_text_field(
    field: &mut Field<'_>,
    name: &'static str,
) -> Result<String, IngestError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if buf.len() + chunk.len() > MAX_ID_FIELD_BYTES {
            return Err(IngestError::FieldTooLarge {
                field: name,
                limit: MAX_ID_FIELD_BYTES,
            });
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf).map_err(|_| IngestError::InvalidField(name))
}
