//! Shared router state, built once at startup.

use crate::{
    config::AppConfig,
    services::{ingest::IngestPipeline, object_store::ObjectStore},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: ObjectStore,
    pub ingest: IngestPipeline,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let store = ObjectStore::new(&config.storage_dir);
        let ingest = IngestPipeline::new(store.clone(), config.max_upload_bytes, config.flat);
        Self {
            config: Arc::new(config),
            store,
            ingest,
        }
    }
}
