//! Nightly Backup Library
//!
//! Archives configured backup sets, packages them into one encrypted bundle,
//! uploads it to object storage and mails a status report.

pub mod archive;
pub mod config;
pub mod notify;
pub mod package;
pub mod pipeline;
pub mod upload;
pub mod utils;

// Re-export commonly used types
pub use crate::config::Config;
pub use pipeline::{Pipeline, RunPlan, RunSummary};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
