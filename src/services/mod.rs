pub mod ingest;
pub mod object_store;
