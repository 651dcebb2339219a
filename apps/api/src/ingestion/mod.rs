//! Job ingestion pipeline: extract → normalize → upsert.

pub mod extractor;
pub mod fetch;
pub mod handlers;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod sources;
pub mod store;
pub mod summary;
pub mod upsert;
