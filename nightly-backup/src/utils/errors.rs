//! Error types for the backup runner.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error for {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start packager `{program}`: {source}")]
    PackagerSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Packager `{program}` exited with {status}")]
    PackagerFailed { program: String, status: ExitStatus },

    #[error("Bundle {0} is missing or empty after packaging")]
    BundleInvalid(PathBuf),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Object storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("Vault error: {0}")]
    Vault(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("{step} timed out after {secs}s")]
    Timeout { step: &'static str, secs: u64 },
}

impl From<config::ConfigError> for BackupError {
    fn from(err: config::ConfigError) -> Self {
        BackupError::Config(err.to_string())
    }
}

impl From<lettre::error::Error> for BackupError {
    fn from(err: lettre::error::Error) -> Self {
        BackupError::Mail(err.to_string())
    }
}

impl From<lettre::address::AddressError> for BackupError {
    fn from(err: lettre::address::AddressError) -> Self {
        BackupError::Mail(format!("invalid address: {}", err))
    }
}

impl From<lettre::transport::smtp::Error> for BackupError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        BackupError::Mail(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// Await `fut`, failing with [`BackupError::Timeout`] once `secs` elapse.
pub async fn with_timeout<T, F>(step: &'static str, secs: u64, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(std::time::Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(BackupError::Timeout { step, secs }),
    }
}
