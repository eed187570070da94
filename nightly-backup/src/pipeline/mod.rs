//! Backup run orchestration.
//!
//! One run walks a fixed, linear sequence with no retries:
//!
//! 1. open the temp workspace (`<data_dir>/temp`)
//! 2. archive every backup set into the workspace
//! 3. package and encrypt all archives into one bundle
//! 4. verify the bundle and delete the intermediates
//! 5. upload the bundle (and optionally archive it in the vault)
//! 6. gather disk usage, best-effort
//! 7. mail the report
//!
//! A failure in steps 1-5 aborts the run; nothing is reported by mail unless
//! `notify.on_failure` is set. A mail failure in step 7 is returned after the
//! bundle has already been persisted and uploaded.

pub mod workspace;

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::archive::{ArchiveArtifact, Archiver};
use crate::config::Config;
use crate::notify::{DiskUsageCheck, Mailer, Notifier, RunReport, SmtpMailer};
use crate::package::{Packager, SevenZipPackager};
use crate::upload::{build_store, ObjectUploader, VaultArchive, VaultUploader};
use crate::utils::errors::{BackupError, Result};
use workspace::TempWorkspace;

/// Run stamp used in every file name of a run.
pub const RUN_STAMP_FORMAT: &str = "%Y%m%d%H%M";

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub bundle: PathBuf,
    pub uploaded_key: String,
    pub vault_archive: Option<VaultArchive>,
    pub archives: usize,
}

pub struct Pipeline<'a> {
    config: &'a Config,
    archiver: Archiver,
    packager: Box<dyn Packager>,
    uploader: ObjectUploader,
    vault: Option<VaultUploader>,
    notifier: Notifier,
    disk_check: DiskUsageCheck,
}

impl<'a> Pipeline<'a> {
    /// Wire the production collaborators described by `config`.
    pub fn from_config(config: &'a Config) -> Result<Self> {
        let timeouts = &config.timeouts;

        let uploader = ObjectUploader::new(build_store(&config.storage)?, timeouts.upload_secs);
        let vault = match &config.vault {
            Some(vault) => Some(VaultUploader::new(
                build_store(&vault.backend)?,
                vault,
                timeouts.upload_secs,
            )),
            None => None,
        };
        let packager = SevenZipPackager::new(&config.package, timeouts.packager_secs);
        let mailer = SmtpMailer::new(&config.smtp, timeouts.smtp_secs);

        Ok(Self::new(config, Box::new(packager), uploader, vault, Arc::new(mailer)))
    }

    pub fn new(
        config: &'a Config,
        packager: Box<dyn Packager>,
        uploader: ObjectUploader,
        vault: Option<VaultUploader>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let notifier = Notifier::new(
            mailer,
            config.notify.recipients.clone(),
            config.notify.subject.clone(),
        );
        let disk_check = DiskUsageCheck::new(
            config.notify.disk_usage_command.clone(),
            config.timeouts.diagnostics_secs,
        );

        Self {
            config,
            archiver: Archiver::new(&config.archive),
            packager,
            uploader,
            vault,
            notifier,
            disk_check,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.run_at(Local::now()).await
    }

    /// Execute one run stamped with `now`.
    pub async fn run_at(&self, now: DateTime<Local>) -> Result<RunSummary> {
        info!("=========================== start : backup data ==========================");
        let host = self.config.host_label();

        let summary = match self.backup(now).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Backup run failed");
                if self.config.notify.on_failure {
                    if let Err(mail_err) = self.notifier.send_failure(&host, now, &e.to_string()).await {
                        warn!(error = %mail_err, "Failed to send failure notification");
                    }
                }
                return Err(e);
            }
        };

        let disk_usage = self.disk_check.collect().await;
        let report = RunReport {
            timestamp: now,
            host,
            bundle_name: bundle_name(&summary.bundle),
            vault_archive_id: summary.vault_archive.as_ref().map(|v| v.archive_id.clone()),
            disk_usage,
        };
        self.notifier.send_report(&report).await?;

        info!("=========================== end : backup data ==========================");
        Ok(summary)
    }

    /// Steps 1-5: everything whose failure means no usable backup.
    async fn backup(&self, now: DateTime<Local>) -> Result<RunSummary> {
        let stamp = now.format(RUN_STAMP_FORMAT).to_string();
        let mut workspace = TempWorkspace::create(self.config.temp_dir())?;

        let mut artifacts: Vec<ArchiveArtifact> = Vec::with_capacity(self.config.backup_sets.len());
        for set in &self.config.backup_sets {
            let dest = workspace.dir().join(self.archiver.file_name(&set.name, &stamp));
            workspace.track(dest.clone());

            let archiver = self.archiver;
            let paths = set.paths.clone();
            let artifact = tokio::task::spawn_blocking(move || archiver.archive(&dest, &paths))
                .await
                .map_err(|e| BackupError::Io(std::io::Error::other(e)))??;
            info!(set = %set.name, size_bytes = artifact.size_bytes, "Backup set archived");
            artifacts.push(artifact);
        }

        let bundle = self.config.bundle_path(&stamp);
        let inputs: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
        self.packager
            .package(&bundle, &inputs, self.config.package.password())
            .await?;

        let removed = workspace.cleanup(&bundle)?;
        info!(removed, "Removed intermediate archives");

        let uploaded_key = self.uploader.upload(&bundle).await?;
        let vault_archive = match &self.vault {
            Some(vault) => Some(vault.upload(&bundle, None).await?),
            None => None,
        };

        Ok(RunSummary {
            bundle,
            uploaded_key,
            vault_archive,
            archives: artifacts.len(),
        })
    }
}

/// What a run stamped `now` would do, computed without touching disk,
/// network or mail.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// `(set name, intermediate archive path, source paths)` in run order.
    pub archives: Vec<(String, PathBuf, Vec<PathBuf>)>,
    pub bundle: PathBuf,
    pub encrypted: bool,
    pub vault: bool,
    pub recipients: Vec<String>,
}

impl RunPlan {
    pub fn new(config: &Config, now: DateTime<Local>) -> Self {
        let stamp = now.format(RUN_STAMP_FORMAT).to_string();
        let archiver = Archiver::new(&config.archive);
        let temp_dir = config.temp_dir();

        let archives = config
            .backup_sets
            .iter()
            .map(|set| {
                let dest = temp_dir.join(archiver.file_name(&set.name, &stamp));
                (set.name.clone(), dest, set.paths.clone())
            })
            .collect();

        Self {
            archives,
            bundle: config.bundle_path(&stamp),
            encrypted: config.package.password().is_some(),
            vault: config.vault.is_some(),
            recipients: config.notify.recipients.clone(),
        }
    }

    /// Emit the plan through the log, one line per set.
    pub fn log(&self) {
        for (name, dest, paths) in &self.archives {
            info!(set = %name, archive = %dest.display(), paths = ?paths, "Would archive backup set");
        }
        info!(
            bundle = %self.bundle.display(),
            encrypted = self.encrypted,
            vault = self.vault,
            recipients = ?self.recipients,
            "Would package, upload and notify"
        );
    }
}

fn bundle_name(bundle: &std::path::Path) -> String {
    bundle
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| bundle.display().to_string())
}
