pub mod config;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod database;
pub mod backup;
pub mod query;
pub mod api;
pub mod analyzer;
pub mod image;
pub mod render;
pub mod logging;

pub use config::Config;
pub use error::NotebookError;
pub use models::*;
pub use database::{RecordStore, SqliteRecordStore};
pub use analyzer::{AnalysisProvider, Notebook, RemoteAnalyzer};
pub use query::RecordQuery;
