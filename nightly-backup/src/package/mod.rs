//! Encrypted bundle packaging.
//!
//! The per-set tarballs cannot carry a password themselves, so every archive
//! of a run is bundled into one password-protected zip by an external
//! 7-Zip compatible tool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::PackageConfig;
use crate::utils::errors::{with_timeout, BackupError, Result};

/// Bundles `inputs` into a single container at `output`.
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(&self, output: &Path, inputs: &[PathBuf], password: Option<&str>) -> Result<()>;
}

/// Runs `7z a` (or a compatible program) as a subprocess.
#[derive(Debug, Clone)]
pub struct SevenZipPackager {
    program: String,
    extra_args: Vec<String>,
    timeout_secs: u64,
}

impl SevenZipPackager {
    pub fn new(config: &PackageConfig, timeout_secs: u64) -> Self {
        Self {
            program: config.program.clone(),
            extra_args: config.extra_args.clone(),
            timeout_secs,
        }
    }

    /// Command line arguments for one packaging call.
    pub fn build_args(&self, output: &Path, inputs: &[PathBuf], password: Option<&str>) -> Vec<String> {
        let mut args = vec!["a".to_string(), "-y".to_string(), "-tzip".to_string()];
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            args.push(format!("-p{}", password));
            args.push("-mem=AES256".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(output.display().to_string());
        args.extend(inputs.iter().map(|p| p.display().to_string()));
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| BackupError::PackagerSpawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(BackupError::PackagerFailed {
                program: self.program.clone(),
                status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Packager for SevenZipPackager {
    async fn package(&self, output: &Path, inputs: &[PathBuf], password: Option<&str>) -> Result<()> {
        let start_time = Instant::now();

        // `7z a` appends to an existing archive; start from scratch instead
        match tokio::fs::remove_file(output).await {
            Ok(()) => debug!(bundle = %output.display(), "Removed stale bundle"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let args = self.build_args(output, inputs, password);
        with_timeout("packager", self.timeout_secs, self.run(args)).await?;

        info!(
            bundle = %output.display(),
            inputs = inputs.len(),
            encrypted = password.is_some_and(|p| !p.is_empty()),
            elapsed_secs = start_time.elapsed().as_secs(),
            "Packaged bundle"
        );
        Ok(())
    }
}

/// Check that a packaged bundle exists and is non-empty.
pub fn verify_bundle(path: &Path) -> Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        _ => Err(BackupError::BundleInvalid(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn packager(program: &str) -> SevenZipPackager {
        SevenZipPackager::new(
            &PackageConfig {
                program: program.to_string(),
                password: None,
                extra_args: Vec::new(),
            },
            30,
        )
    }

    fn has_seven_zip() -> bool {
        std::process::Command::new("7z")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    #[test]
    fn test_build_args_with_password() {
        let args = packager("7z").build_args(
            Path::new("/data/backup_202610160200.zip"),
            &[PathBuf::from("/data/temp/web.tar.gz"), PathBuf::from("/data/temp/db.tar.gz")],
            Some("s3cret"),
        );

        assert_eq!(
            args,
            [
                "a",
                "-y",
                "-tzip",
                "-ps3cret",
                "-mem=AES256",
                "/data/backup_202610160200.zip",
                "/data/temp/web.tar.gz",
                "/data/temp/db.tar.gz",
            ]
        );
    }

    #[test]
    fn test_build_args_without_password() {
        let args = packager("7z").build_args(Path::new("out.zip"), &[PathBuf::from("in.tar.gz")], Some(""));
        assert_eq!(args, ["a", "-y", "-tzip", "out.zip", "in.tar.gz"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = packager("false")
            .package(&temp_dir.path().join("out.zip"), &[], None)
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::PackagerFailed { ref program, .. } if program == "false"));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = packager("definitely-not-a-packager-binary")
            .package(&temp_dir.path().join("out.zip"), &[], None)
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::PackagerSpawn { .. }));
    }

    #[tokio::test]
    async fn test_stale_output_removed_before_packaging() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("out.zip");
        fs::write(&output, b"stale").unwrap();

        packager("true").package(&output, &[], None).await.unwrap();
        assert!(!output.exists());
    }

    #[test]
    fn test_verify_bundle() {
        let temp_dir = TempDir::new().unwrap();
        let empty = temp_dir.path().join("empty.zip");
        fs::write(&empty, b"").unwrap();
        let full = temp_dir.path().join("full.zip");
        fs::write(&full, b"PK").unwrap();

        assert!(matches!(verify_bundle(&empty), Err(BackupError::BundleInvalid(_))));
        assert!(verify_bundle(&temp_dir.path().join("missing.zip")).is_err());
        assert_eq!(verify_bundle(&full).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_password_protected_round_trip() {
        if !has_seven_zip() {
            eprintln!("7z not on PATH, skipping");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("web.tar.gz");
        fs::write(&input, b"archived payload").unwrap();
        let output = temp_dir.path().join("bundle.zip");

        packager("7z").package(&output, &[input], Some("s3cret")).await.unwrap();
        verify_bundle(&output).unwrap();

        let extract = |password: &str, dir: &Path| {
            std::process::Command::new("7z")
                .arg("x")
                .arg("-y")
                .arg(format!("-p{}", password))
                .arg(format!("-o{}", dir.display()))
                .arg(&output)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .unwrap()
        };

        let wrong = temp_dir.path().join("wrong");
        assert!(!extract("guess", &wrong).success());

        for attempt in ["first", "second"] {
            let dir = temp_dir.path().join(attempt);
            assert!(extract("s3cret", &dir).success());
            assert_eq!(fs::read(dir.join("web.tar.gz")).unwrap(), b"archived payload");
        }
    }
}
