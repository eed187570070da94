//! Configuration management for the backup runner.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`NIGHTLY_BACKUP_<SECTION>__<KEY>`), so secrets can stay out of the file.
//! The result is built once at startup and passed by reference everywhere.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::utils::errors::{BackupError, Result};

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "NIGHTLY_BACKUP";

/// Default single-shot ceiling for vault uploads (200 MiB).
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 200 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub run: RunConfig,
    pub backup_sets: Vec<BackupSet>,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub package: PackageConfig,
    pub storage: StoreBackend,
    #[serde(default)]
    pub vault: Option<VaultConfig>,
    pub smtp: SmtpConfig,
    pub notify: NotifyConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root for the temp workspace and the final bundles
    pub data_dir: PathBuf,

    /// Final bundle is named `<bundle_prefix>_<YYYYMMDDHHMM>.zip`
    #[serde(default = "default_bundle_prefix")]
    pub bundle_prefix: String,

    /// Append-only run log (default: `<data_dir>/nightly-backup.log`)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Host name shown in reports (default: system host name)
    #[serde(default)]
    pub host_label: Option<String>,
}

/// A named group of filesystem paths archived together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSet {
    pub name: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Gzip,
    Zstd,
}

impl Compression {
    pub fn extension(self) -> &'static str {
        match self {
            Compression::Gzip => "tar.gz",
            Compression::Zstd => "tar.zst",
        }
    }

    pub fn default_level(self) -> i32 {
        match self {
            Compression::Gzip => 6,
            Compression::Zstd => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub compression: Compression,

    /// Compression level (gzip 0-9, zstd 1-22)
    #[serde(default)]
    pub level: Option<i32>,

    /// Archive symlink targets instead of the links themselves
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl ArchiveConfig {
    pub fn effective_level(&self) -> i32 {
        self.level.unwrap_or_else(|| self.compression.default_level())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Packaging tool (7-Zip compatible command line)
    #[serde(default = "default_packager")]
    pub program: String,

    /// Bundle password; empty means no protection
    #[serde(default)]
    pub password: Option<String>,

    /// Extra switches placed before the output path
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            program: default_packager(),
            password: None,
            extra_args: Vec::new(),
        }
    }
}

impl PackageConfig {
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

/// Object storage backend for the bucket and the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreBackend {
    /// Local directory (useful for staging and tests)
    Local { path: PathBuf },

    /// S3-compatible storage (AWS S3, Aliyun OSS, MinIO, ...)
    S3 {
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        virtual_hosted_style: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub backend: StoreBackend,

    /// Files at or above this size use a multipart upload
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,

    /// Part size for multipart uploads
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Archive description (default: bundle file name)
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmtpSecurity {
    #[default]
    None,
    Starttls,
    Tls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub server: String,

    /// Default: 25 without TLS, 587 for STARTTLS, 465 for implicit TLS
    #[serde(default)]
    pub port: Option<u16>,

    pub username: String,

    pub password: String,

    #[serde(default)]
    pub security: SmtpSecurity,

    /// Sender address (default: username)
    #[serde(default)]
    pub from: Option<String>,
}

impl SmtpSecurity {
    pub fn default_port(self) -> u16 {
        match self {
            SmtpSecurity::None => 25,
            SmtpSecurity::Starttls => 587,
            SmtpSecurity::Tls => 465,
        }
    }
}

impl SmtpConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.security.default_port())
    }

    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub recipients: Vec<String>,

    #[serde(default = "default_subject")]
    pub subject: String,

    /// Diagnostic command whose stdout is appended to the report
    #[serde(default = "default_disk_usage_command")]
    pub disk_usage_command: Vec<String>,

    /// Also mail a report when the run fails
    #[serde(default)]
    pub on_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_long_timeout")]
    pub packager_secs: u64,

    #[serde(default = "default_long_timeout")]
    pub upload_secs: u64,

    #[serde(default = "default_smtp_timeout")]
    pub smtp_secs: u64,

    #[serde(default = "default_diagnostics_timeout")]
    pub diagnostics_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            packager_secs: default_long_timeout(),
            upload_secs: default_long_timeout(),
            smtp_secs: default_smtp_timeout(),
            diagnostics_secs: default_diagnostics_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_bundle_prefix() -> String {
    "backup".to_string()
}

fn default_packager() -> String {
    "7z".to_string()
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

fn default_part_size() -> u64 {
    64 * 1024 * 1024 // 64MB
}

fn default_subject() -> String {
    "Nightly backup report".to_string()
}

fn default_disk_usage_command() -> Vec<String> {
    vec!["df".to_string(), "-h".to_string()]
}

fn default_long_timeout() -> u64 {
    6 * 60 * 60
}

fn default_smtp_timeout() -> u64 {
    120
}

fn default_diagnostics_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file, then apply `.env` and
    /// environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config: Config = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text without consulting the environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.backup_sets.is_empty() {
            return Err(BackupError::Config("no backup sets configured".into()));
        }

        let mut seen = HashSet::new();
        for set in &self.backup_sets {
            if !is_file_safe_name(&set.name) {
                return Err(BackupError::Config(format!(
                    "backup set name {:?} must be non-empty and use only [A-Za-z0-9._-]",
                    set.name
                )));
            }
            if !seen.insert(set.name.as_str()) {
                return Err(BackupError::Config(format!(
                    "duplicate backup set name {:?}",
                    set.name
                )));
            }
            if set.paths.is_empty() {
                return Err(BackupError::Config(format!(
                    "backup set {:?} has no paths",
                    set.name
                )));
            }
        }

        if !is_file_safe_name(&self.run.bundle_prefix) {
            return Err(BackupError::Config(format!(
                "bundle prefix {:?} must be non-empty and use only [A-Za-z0-9._-]",
                self.run.bundle_prefix
            )));
        }

        if self.notify.recipients.is_empty() {
            return Err(BackupError::Config("no notification recipients configured".into()));
        }

        if let Some(vault) = &self.vault {
            if vault.multipart_threshold == 0 || vault.part_size == 0 {
                return Err(BackupError::Config(
                    "vault multipart_threshold and part_size must be positive".into(),
                ));
            }
        }

        Ok(())
    }

    /// Temp workspace holding per-set archives.
    pub fn temp_dir(&self) -> PathBuf {
        self.run.data_dir.join("temp")
    }

    /// Final bundle for the run stamped `stamp`.
    pub fn bundle_path(&self, stamp: &str) -> PathBuf {
        self.run
            .data_dir
            .join(format!("{}_{}.zip", self.run.bundle_prefix, stamp))
    }

    pub fn log_file(&self) -> PathBuf {
        self.run
            .log_file
            .clone()
            .unwrap_or_else(|| self.run.data_dir.join("nightly-backup.log"))
    }

    pub fn host_label(&self) -> String {
        self.run.host_label.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string())
        })
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn is_file_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[run]
data_dir = "/var/lib/nightly-backup"
bundle_prefix = "site_bak"

[[backup_sets]]
name = "site_web"
paths = ["/usr/local/apache2/htdocs/", "/usr/local/apache2/conf/"]

[[backup_sets]]
name = "site_database"
paths = ["/usr/local/mysql/data/", "/etc/my.cnf"]

[package]
password = "s3cret"

[storage]
type = "s3"
endpoint = "http://oss-cn-beijing.aliyuncs.com"
access_key = "AK"
secret_key = "SK"
bucket = "backups"

[vault]
backend = { type = "local", path = "/srv/vault" }

[smtp]
server = "smtp.example.com"
username = "robot@example.com"
password = "pw"

[notify]
recipients = ["ops@example.com"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.run.bundle_prefix, "site_bak");
        let names: Vec<_> = config.backup_sets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["site_web", "site_database"]);
        assert_eq!(config.backup_sets[1].paths[1], PathBuf::from("/etc/my.cnf"));
        assert_eq!(config.package.password(), Some("s3cret"));
        assert_eq!(config.package.program, "7z");
        assert_eq!(config.archive.compression, Compression::Gzip);
        assert_eq!(config.archive.effective_level(), 6);
        assert_eq!(config.smtp.port(), 25);
        assert_eq!(config.smtp.sender(), "robot@example.com");
        assert_eq!(config.notify.disk_usage_command, ["df", "-h"]);
        assert!(!config.notify.on_failure);
        assert!(matches!(config.storage, StoreBackend::S3 { ref bucket, .. } if bucket == "backups"));

        let vault = config.vault.as_ref().unwrap();
        assert_eq!(vault.multipart_threshold, 200 * 1024 * 1024);
        assert!(matches!(vault.backend, StoreBackend::Local { .. }));

        assert_eq!(config.temp_dir(), PathBuf::from("/var/lib/nightly-backup/temp"));
        assert_eq!(
            config.bundle_path("202610160200"),
            PathBuf::from("/var/lib/nightly-backup/site_bak_202610160200.zip")
        );
        assert_eq!(
            config.log_file(),
            PathBuf::from("/var/lib/nightly-backup/nightly-backup.log")
        );
    }

    #[test]
    fn test_smtp_port_follows_security() {
        let tls = Config::from_toml_str(&SAMPLE.replace(
            "password = \"pw\"",
            "password = \"pw\"\nsecurity = \"tls\"",
        ))
        .unwrap();
        assert_eq!(tls.smtp.security, SmtpSecurity::Tls);
        assert_eq!(tls.smtp.port(), 465);

        let starttls = Config::from_toml_str(&SAMPLE.replace(
            "password = \"pw\"",
            "password = \"pw\"\nsecurity = \"starttls\"",
        ))
        .unwrap();
        assert_eq!(starttls.smtp.port(), 587);

        let explicit = Config::from_toml_str(&SAMPLE.replace(
            "password = \"pw\"",
            "password = \"pw\"\nsecurity = \"tls\"\nport = 2465",
        ))
        .unwrap();
        assert_eq!(explicit.smtp.port(), 2465);
    }

    #[test]
    fn test_empty_password_means_unprotected() {
        let config = Config::from_toml_str(&SAMPLE.replace("\"s3cret\"", "\"\"")).unwrap();
        assert_eq!(config.package.password(), None);
    }

    #[test]
    fn test_rejects_duplicate_set_names() {
        let toml = SAMPLE.replace("name = \"site_database\"", "name = \"site_web\"");
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("duplicate backup set name"));
    }

    #[test]
    fn test_rejects_unsafe_set_names() {
        let toml = SAMPLE.replace("name = \"site_web\"", "name = \"../web\"");
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_rejects_set_without_paths() {
        let toml = SAMPLE.replace(
            "paths = [\"/usr/local/mysql/data/\", \"/etc/my.cnf\"]",
            "paths = []",
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("has no paths"));
    }

    #[test]
    fn test_rejects_missing_recipients() {
        let toml = SAMPLE.replace("recipients = [\"ops@example.com\"]", "recipients = []");
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_env_overrides_secret() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("nightly-backup.toml");
        std::fs::write(&path, SAMPLE)?;

        std::env::set_var("NIGHTLY_BACKUP_SMTP__PASSWORD", "from-env");
        let config = Config::from_file(&path);
        std::env::remove_var("NIGHTLY_BACKUP_SMTP__PASSWORD");

        assert_eq!(config?.smtp.password, "from-env");
        Ok(())
    }
}
