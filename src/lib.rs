pub mod admin;
pub mod chunker;
pub mod classify;
pub mod core;
pub mod crawl;
pub mod extract;
pub mod ingest;
pub mod jobs;
pub mod scraping;
pub mod search;
pub mod store;

// --- Primary core exports ---
pub use crate::core::error::PipelineError;
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::AppState;
