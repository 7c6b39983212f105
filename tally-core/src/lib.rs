pub mod auth;
pub mod config;
pub mod entry;
pub mod error;
pub mod submission;

pub use config::CollectorConfig;
pub use entry::{EntryMetadata, LogEntry, RequestDetails};
pub use error::{CollectError, ValidationError};
pub use submission::Submission;
