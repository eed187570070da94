//! Input path traversal for backup sets.
//!
//! Expands each configured path into the ordered list of entries that end up
//! in a set's archive, together with the name each entry is stored under.

use std::fs::FileType;
use std::os::unix::fs::FileTypeExt;
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::utils::errors::{BackupError, Result};

/// One filesystem entry to be written into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path on disk
    pub path: PathBuf,

    /// Name inside the archive (always relative)
    pub name: PathBuf,

    /// Is this a directory?
    pub is_dir: bool,
}

/// Archive name for `path`: root, prefix, `.` and `..` components are
/// dropped, so `/etc/my.cnf` is stored as `etc/my.cnf`.
pub fn archive_name(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Name of a file type tar cannot store, or `None` if it can.
fn unsupported_kind(file_type: &FileType) -> Option<&'static str> {
    if file_type.is_file() || file_type.is_dir() || file_type.is_symlink() {
        None
    } else if file_type.is_socket() {
        Some("socket")
    } else if file_type.is_fifo() {
        Some("fifo")
    } else if file_type.is_block_device() || file_type.is_char_device() {
        Some("device")
    } else {
        Some("special file")
    }
}

/// Expand `roots` into archive entries, recursing into directories.
///
/// Sockets, fifos and device nodes are skipped with a warning. Fails on the
/// first root or child that cannot be read, naming that path.
pub fn collect_entries(roots: &[PathBuf], follow_links: bool) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();

    for root in roots {
        std::fs::symlink_metadata(root).map_err(|source| BackupError::Archive {
            path: root.clone(),
            source,
        })?;

        for entry in WalkDir::new(root).follow_links(follow_links).sort_by_file_name() {
            let entry = entry.map_err(|err| BackupError::Archive {
                path: err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone()),
                source: err.into(),
            })?;

            if let Some(kind) = unsupported_kind(&entry.file_type()) {
                warn!(path = %entry.path().display(), kind, "Skipping entry that cannot be archived");
                continue;
            }

            let name = archive_name(entry.path());
            if name.as_os_str().is_empty() {
                // The filesystem root itself has no archive name
                continue;
            }

            entries.push(ArchiveEntry {
                path: entry.path().to_path_buf(),
                name,
                is_dir: entry.file_type().is_dir(),
            });
        }
    }

    Ok(entries)
}
