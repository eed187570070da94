//! Cold-archive vault upload with size-tiered transfer strategy.
//!
//! Files below the threshold go up in one request. Files at or above it use
//! a multipart upload driven part by part to completion. Exactly one strategy
//! is attempted per call; a failed direct upload never retries as multipart.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{MultipartUpload, ObjectStore, PutResult};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use super::base_name;
use crate::config::VaultConfig;
use crate::utils::errors::{with_timeout, BackupError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    Direct,
    Multipart,
}

/// Strategy for a file of `size` bytes.
pub fn select_strategy(size: u64, threshold: u64) -> UploadStrategy {
    if size < threshold {
        UploadStrategy::Direct
    } else {
        UploadStrategy::Multipart
    }
}

/// Result of a vault upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultArchive {
    /// Provider-assigned identifier
    pub archive_id: String,
    pub strategy: UploadStrategy,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct VaultUploader {
    store: Arc<dyn ObjectStore>,
    multipart_threshold: u64,
    part_size: u64,
    description: Option<String>,
    timeout_secs: u64,
}

impl VaultUploader {
    pub fn new(store: Arc<dyn ObjectStore>, config: &VaultConfig, timeout_secs: u64) -> Self {
        Self {
            store,
            multipart_threshold: config.multipart_threshold,
            part_size: config.part_size,
            description: config.description.clone(),
            timeout_secs,
        }
    }

    /// Upload `local_path` to the vault. The archive is stored under
    /// `description`, falling back to the configured description and then
    /// to the file's base name.
    pub async fn upload(&self, local_path: &Path, description: Option<&str>) -> Result<VaultArchive> {
        let start_time = Instant::now();

        let meta = match tokio::fs::metadata(local_path).await {
            Ok(meta) if meta.is_file() => meta,
            _ => return Err(BackupError::FileNotFound(local_path.to_path_buf())),
        };
        let size_bytes = meta.len();

        let description = match description.or(self.description.as_deref()) {
            Some(d) => d.to_string(),
            None => base_name(local_path)?,
        };
        let location = ObjectPath::from(description.as_str());
        let strategy = select_strategy(size_bytes, self.multipart_threshold);

        let result = with_timeout("vault upload", self.timeout_secs, async {
            match strategy {
                UploadStrategy::Direct => self.upload_direct(local_path, &location).await,
                UploadStrategy::Multipart => self.upload_multipart(local_path, &location).await,
            }
        })
        .await?;

        let archive_id = result
            .e_tag
            .or(result.version)
            .ok_or_else(|| BackupError::Vault(format!("no archive id returned for {}", description)))?;

        info!(
            file = %local_path.display(),
            archive_id = %archive_id,
            strategy = ?strategy,
            size_bytes,
            elapsed_secs = start_time.elapsed().as_secs(),
            "Uploaded to vault"
        );

        Ok(VaultArchive {
            archive_id,
            strategy,
            size_bytes,
        })
    }

    async fn upload_direct(&self, local_path: &Path, location: &ObjectPath) -> Result<PutResult> {
        let data = Bytes::from(tokio::fs::read(local_path).await?);
        Ok(self.store.put(location, data.into()).await?)
    }

    async fn upload_multipart(&self, local_path: &Path, location: &ObjectPath) -> Result<PutResult> {
        let mut upload = self.store.put_multipart(location).await?;

        match self.send_parts(local_path, upload.as_mut()).await {
            Ok(parts) => {
                let result = upload.complete().await?;
                info!(location = %location, parts, "Completed multipart upload");
                Ok(result)
            }
            Err(e) => {
                if let Err(abort_err) = upload.abort().await {
                    warn!(location = %location, error = %abort_err, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn send_parts(&self, local_path: &Path, upload: &mut dyn MultipartUpload) -> Result<usize> {
        let mut file = tokio::fs::File::open(local_path).await?;
        let part_size = usize::try_from(self.part_size)
            .map_err(|_| BackupError::Config(format!("part size {} too large", self.part_size)))?;
        let mut parts = 0usize;

        loop {
            let chunk = read_chunk(&mut file, part_size).await?;
            if chunk.is_empty() {
                break;
            }
            let last = chunk.len() < part_size;
            upload.put_part(Bytes::from(chunk).into()).await?;
            parts += 1;
            if last {
                break;
            }
        }

        Ok(parts)
    }
}

/// Read up to `size` bytes, short only at end of file.
async fn read_chunk(file: &mut tokio::fs::File, size: usize) -> std::io::Result<Vec<u8>> {
    let mut chunk = Vec::with_capacity(size);
    let mut limited = file.take(size as u64);
    limited.read_to_end(&mut chunk).await?;
    Ok(chunk)
}
