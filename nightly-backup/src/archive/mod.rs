//! Per-set archiver.
//!
//! Writes one compressed tarball per backup set. The destination is always
//! created or truncated, never appended to, so re-running against an
//! existing file cannot duplicate entries.

pub mod walker;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::config::{ArchiveConfig, Compression};
use crate::utils::errors::{BackupError, Result};
use walker::{collect_entries, ArchiveEntry};

/// A per-set archive produced for a run. Deleted once packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub entries: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Archiver {
    compression: Compression,
    level: i32,
    follow_symlinks: bool,
}

impl Archiver {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            compression: config.compression,
            level: config.effective_level(),
            follow_symlinks: config.follow_symlinks,
        }
    }

    /// File name of a set's archive for the run stamped `stamp`.
    pub fn file_name(&self, set_name: &str, stamp: &str) -> String {
        format!("{}_{}.{}", set_name, stamp, self.compression.extension())
    }

    /// Archive `paths` (files or directories, recursively) into `dest`.
    ///
    /// Blocking; any unreadable input or unwritable destination is an error.
    pub fn archive(&self, dest: &Path, paths: &[PathBuf]) -> Result<ArchiveArtifact> {
        let start_time = Instant::now();

        let entries = collect_entries(paths, self.follow_symlinks)?;

        let file = File::create(dest).map_err(|source| BackupError::Archive {
            path: dest.to_path_buf(),
            source,
        })?;
        let writer = BufWriter::new(file);

        let finish = |result: std::io::Result<BufWriter<File>>| -> Result<()> {
            let mut writer = result.map_err(|source| BackupError::Archive {
                path: dest.to_path_buf(),
                source,
            })?;
            writer.flush()?;
            Ok(())
        };

        match self.compression {
            Compression::Gzip => {
                let level = flate2::Compression::new(self.level.clamp(0, 9) as u32);
                let encoder = flate2::write::GzEncoder::new(writer, level);
                let encoder = self.write_tar(encoder, &entries)?;
                finish(encoder.finish())?;
            }
            Compression::Zstd => {
                let encoder = zstd::stream::write::Encoder::new(writer, self.level)?;
                let encoder = self.write_tar(encoder, &entries)?;
                finish(encoder.finish())?;
            }
        }

        let size_bytes = std::fs::metadata(dest)?.len();
        info!(
            archive = %dest.display(),
            entries = entries.len(),
            size_bytes,
            elapsed_secs = start_time.elapsed().as_secs(),
            "Archived backup set"
        );

        Ok(ArchiveArtifact {
            path: dest.to_path_buf(),
            size_bytes,
            entries: entries.len(),
        })
    }

    fn write_tar<W: Write>(&self, writer: W, entries: &[ArchiveEntry]) -> Result<W> {
        let mut builder = tar::Builder::new(writer);
        builder.follow_symlinks(self.follow_symlinks);

        for entry in entries {
            let appended = if entry.is_dir {
                builder.append_dir(&entry.name, &entry.path)
            } else {
                builder.append_path_with_name(&entry.path, &entry.name)
            };
            appended.map_err(|source| BackupError::Archive {
                path: entry.path.clone(),
                source,
            })?;
        }

        builder.into_inner().map_err(BackupError::from)
    }
}
