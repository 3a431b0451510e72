//! src/services/object_store.rs
//!
//! ObjectStore: per-client buckets of immutable blobs on local disk, laid
//! out as `root/{client}/{name}` (or `root/{name}` for the shared, flat
//! layout). Writes go through a staged temporary file that is published with
//! an exclusive hard link, so an object path only ever appears with its full
//! content and is never overwritten.

use crate::models::{
    client::ClientId,
    object::{ObjectEntry, ObjectName},
};
use chrono::{DateTime, Utc};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncRead, AsyncWriteExt},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of in-flight staging files. Sanitized names never start with a dot,
/// so these can't collide with objects and are skipped by listings.
const STAGING_PREFIX: &str = ".tmp-";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{name}` not found")]
    NotFound { name: String },
    #[error("could not create bucket directory {}: {source}", .path.display())]
    CreateBucket { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of wiping a client's bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The bucket held no objects; nothing was deleted.
    NothingToClear,
    /// The bucket directory was removed along with `removed` objects.
    Cleared { removed: usize },
}

/// Local-disk object store.
///
/// A `None` client addresses the shared directory at the store root, used
/// when per-client bucketing is switched off.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, client: Option<&ClientId>) -> PathBuf {
        match client {
            Some(client) => self.root.join(client.as_str()),
            None => self.root.clone(),
        }
    }

    fn object_path(&self, client: Option<&ClientId>, name: &ObjectName) -> PathBuf {
        self.bucket_path(client).join(name.as_str())
    }

    async fn ensure_bucket(&self, client: Option<&ClientId>) -> StoreResult<PathBuf> {
        let path = self.bucket_path(client);
        fs::create_dir_all(&path)
            .await
            .map_err(|source| StoreError::CreateBucket {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Store the full content of `reader` under `name` unless it already exists.
    ///
    /// Convenience form of [`ObjectStore::stage`] plus [`ObjectStore::commit`]
    /// for callers that know the name up front. Multipart ingestion drives the
    /// two steps itself because the name may arrive after the file part.
    ///
    /// Returns `true` when the object was already present; in that case the
    /// reader is left untouched.
    pub async fn put<R>(
        &self,
        client: Option<&ClientId>,
        name: &ObjectName,
        reader: &mut R,
    ) -> StoreResult<bool>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let bucket = self.ensure_bucket(client).await?;
        if fs::try_exists(bucket.join(name.as_str())).await? {
            debug!("object {} already present, skipping write", name);
            return Ok(true);
        }

        let mut staged = self.stage(client).await?;
        tokio::io::copy(reader, staged.file_mut()).await?;
        self.commit(staged, name).await
    }

    /// Open a fresh staging file inside the client's bucket, creating the
    /// bucket directory if needed.
    pub async fn stage(&self, client: Option<&ClientId>) -> StoreResult<StagedObject> {
        let bucket = self.ensure_bucket(client).await?;
        let path = bucket.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        let file = match open_staging(&path).await {
            Ok(file) => file,
            // An aborted upload may have pruned the empty bucket in between.
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.ensure_bucket(client).await?;
                open_staging(&path).await?
            }
            Err(err) => return Err(err.into()),
        };

        Ok(StagedObject {
            file,
            path,
            bucket,
            prune_bucket: client.is_some(),
            armed: true,
        })
    }

    /// Publish a staged file under `name`.
    ///
    /// The link is exclusive: if another writer got there first the staged
    /// content is discarded and `true` is returned.
    pub async fn commit(&self, mut staged: StagedObject, name: &ObjectName) -> StoreResult<bool> {
        staged.file.flush().await?;
        staged.file.sync_all().await?;

        let target = staged.bucket.join(name.as_str());
        match fs::hard_link(&staged.path, &target).await {
            Ok(()) => {
                staged.remove().await;
                info!("stored object {}", target.display());
                Ok(false)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                staged.remove().await;
                debug!("object {} already present, discarding upload", target.display());
                Ok(true)
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Open an object for streaming. Returns the handle and its length.
    pub async fn get(
        &self,
        client: Option<&ClientId>,
        name: &ObjectName,
    ) -> StoreResult<(File, u64)> {
        let not_found = || StoreError::NotFound {
            name: name.to_string(),
        };
        let path = self.object_path(client, name);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                not_found()
            } else {
                StoreError::Io(err)
            }
        })?;

        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(not_found());
        }
        Ok((file, meta.len()))
    }

    /// Number of objects in the bucket; 0 when the bucket does not exist.
    pub async fn count(&self, client: Option<&ClientId>) -> StoreResult<usize> {
        let mut dir = match fs::read_dir(self.bucket_path(client)).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut count = 0;
        while let Some(entry) = dir.next_entry().await? {
            if is_object_entry(&entry).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Objects in the bucket, sorted by name.
    pub async fn list(&self, client: Option<&ClientId>) -> StoreResult<Vec<ObjectEntry>> {
        let mut dir = match fs::read_dir(self.bucket_path(client)).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !is_object_entry(&entry).await? {
                continue;
            }
            let meta = entry.metadata().await?;
            let last_modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            entries.push(ObjectEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: meta.len(),
                last_modified,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Remove a client's bucket and everything in it.
    ///
    /// Best-effort: a failure part way through leaves whatever was not yet
    /// deleted in place.
    pub async fn clear(&self, client: &ClientId) -> StoreResult<ClearOutcome> {
        let removed = self.count(Some(client)).await?;
        if removed == 0 {
            return Ok(ClearOutcome::NothingToClear);
        }

        let path = self.bucket_path(Some(client));
        fs::remove_dir_all(&path).await.map_err(|err| {
            warn!("failed to clear bucket {}: {}", path.display(), err);
            StoreError::Io(err)
        })?;
        info!("cleared {} objects from bucket {}", removed, client);
        Ok(ClearOutcome::Cleared { removed })
    }
}

async fn open_staging(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

async fn is_object_entry(entry: &fs::DirEntry) -> io::Result<bool> {
    if entry.file_name().to_string_lossy().starts_with('.') {
        return Ok(false);
    }
    Ok(entry.file_type().await?.is_file())
}

/// An upload in progress: a temporary file inside the target bucket.
///
/// Dropping it without a successful [`ObjectStore::commit`] deletes the
/// temporary file, which covers aborted and disconnected uploads. A client
/// bucket left empty by that is removed as well.
#[derive(Debug)]
pub struct StagedObject {
    file: File,
    path: PathBuf,
    bucket: PathBuf,
    prune_bucket: bool,
    armed: bool,
}

impl StagedObject {
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await
    }

    async fn remove(&mut self) {
        self.armed = false;
        if let Err(err) = fs::remove_file(&self.path).await {
            debug!("failed to remove staging file {}: {}", self.path.display(), err);
        }
    }
}

impl Drop for StagedObject {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let _ = std::fs::remove_file(&self.path);
        // Fails harmlessly unless the bucket is empty.
        if self.prune_bucket && std::fs::remove_dir(&self.bucket).is_ok() {
            debug!("pruned empty bucket {}", self.bucket.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn setup() -> (ObjectStore, TempDir) {
        let dir = TempDir::new().unwrap();
        (ObjectStore::new(dir.path()), dir)
    }

    fn client(raw: &str) -> ClientId {
        ClientId::parse_untrusted(raw).unwrap()
    }

    fn name(raw: &str) -> ObjectName {
        ObjectName::sanitize(raw).unwrap()
    }

    async fn read_all(store: &ObjectStore, client: Option<&ClientId>, n: &ObjectName) -> Vec<u8> {
        let (mut file, len) = store.get(client, n).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf.len() as u64, len);
        buf
    }

    #[tokio::test]
    async fn put_then_get_returns_content() {
        let (store, _dir) = setup();
        let id = client("10.0.0.5");
        let cover = name("cover.jpg");
        let content = vec![0xFFu8, 0xD8, 0xFF, 0xE0, 1, 2, 3];

        let existed = store
            .put(Some(&id), &cover, &mut content.as_slice())
            .await
            .unwrap();
        assert!(!existed);
        assert_eq!(read_all(&store, Some(&id), &cover).await, content);
    }

    #[tokio::test]
    async fn first_write_wins() {
        let (store, _dir) = setup();
        let id = client("10.0.0.5");
        let cover = name("cover.jpg");

        assert!(!store.put(Some(&id), &cover, &mut &b"first"[..]).await.unwrap());
        assert!(store.put(Some(&id), &cover, &mut &b"second"[..]).await.unwrap());
        assert_eq!(read_all(&store, Some(&id), &cover).await, b"first");
    }

    #[tokio::test]
    async fn buckets_are_isolated() {
        let (store, _dir) = setup();
        let a = client("10.0.0.5");
        let b = client("10.0.0.6");
        let cover = name("cover.jpg");

        store.put(Some(&a), &cover, &mut &b"a"[..]).await.unwrap();
        assert!(matches!(
            store.get(Some(&b), &cover).await,
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(store.count(Some(&b)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (store, _dir) = setup();
        let id = client("10.0.0.5");
        assert!(matches!(
            store.get(Some(&id), &name("nope.png")).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn count_and_list_skip_staging_files() {
        let (store, _dir) = setup();
        let id = client("10.0.0.5");
        store.put(Some(&id), &name("b.png"), &mut &b"bb"[..]).await.unwrap();
        store.put(Some(&id), &name("a.png"), &mut &b"a"[..]).await.unwrap();
        let _pending = store.stage(Some(&id)).await.unwrap();

        assert_eq!(store.count(Some(&id)).await.unwrap(), 2);
        let listing = store.list(Some(&id)).await.unwrap();
        let names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png"]);
        assert_eq!(listing[1].size_bytes, 2);
    }

    #[tokio::test]
    async fn dropped_stage_leaves_nothing_behind() {
        let (store, dir) = setup();
        let id = client("10.0.0.5");
        {
            let mut staged = store.stage(Some(&id)).await.unwrap();
            staged.write_chunk(b"partial").await.unwrap();
        }
        assert!(!dir.path().join("10.0.0.5").exists());
    }

    #[tokio::test]
    async fn dropped_stage_keeps_populated_bucket() {
        let (store, dir) = setup();
        let id = client("10.0.0.5");
        store.put(Some(&id), &name("kept.jpg"), &mut &b"k"[..]).await.unwrap();
        drop(store.stage(Some(&id)).await.unwrap());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("10.0.0.5"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, ["kept.jpg"]);
    }

    #[tokio::test]
    async fn dropped_shared_stage_keeps_root() {
        let (store, dir) = setup();
        drop(store.stage(None).await.unwrap());
        assert!(dir.path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn clear_reports_empty_bucket() {
        let (store, _dir) = setup();
        let id = client("10.0.0.5");
        assert_eq!(store.clear(&id).await.unwrap(), ClearOutcome::NothingToClear);
    }

    #[tokio::test]
    async fn clear_removes_all_objects() {
        let (store, dir) = setup();
        let id = client("10.0.0.5");
        store.put(Some(&id), &name("a.png"), &mut &b"a"[..]).await.unwrap();
        store.put(Some(&id), &name("b.png"), &mut &b"b"[..]).await.unwrap();

        assert_eq!(
            store.clear(&id).await.unwrap(),
            ClearOutcome::Cleared { removed: 2 }
        );
        assert_eq!(store.count(Some(&id)).await.unwrap(), 0);
        assert!(!dir.path().join("10.0.0.5").exists());
    }

    #[tokio::test]
    async fn flat_layout_uses_store_root() {
        let (store, dir) = setup();
        store.put(None, &name("shared.png"), &mut &b"x"[..]).await.unwrap();
        assert!(dir.path().join("shared.png").is_file());
        assert_eq!(store.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_writers_keep_exactly_one_content() {
        let (store, _dir) = setup();
        let store = Arc::new(store);
        let id = client("10.0.0.5");
        let cover = name("race.png");

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let store = store.clone();
            let id = id.clone();
            let cover = cover.clone();
            handles.push(tokio::spawn(async move {
                let body = vec![i; 4096];
                store.put(Some(&id), &cover, &mut body.as_slice()).await.unwrap()
            }));
        }

        let mut fresh = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);

        let content = read_all(&store, Some(&id), &cover).await;
        assert_eq!(content.len(), 4096);
        assert!(content.iter().all(|b| *b == content[0]));
        assert_eq!(store.count(Some(&id)).await.unwrap(), 1);
    }
}
