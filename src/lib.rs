//! Link source-control repositories to importable roles, manage their
//! notification secrets and follow their import jobs.

pub mod api;
pub mod importer;
pub mod settings;

pub use importer::{ImportError, ImportOrchestrator, RepositoryKey};
pub use settings::Settings;
