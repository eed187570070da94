//! Primary object-storage upload.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::info;

use super::base_name;
use crate::utils::errors::{with_timeout, BackupError, Result};

/// Largest object a single S3-style PUT accepts (5 GiB).
pub const MAX_SINGLE_PUT: u64 = 5 * 1024 * 1024 * 1024;

/// Uploads files into the configured bucket under their base file name.
///
/// Single attempt; keys from different directories with the same file name
/// overwrite each other. The file is read into memory for the one `put`, so
/// peak memory is the bundle size; files above `max_object_size` (default
/// [`MAX_SINGLE_PUT`]) are rejected before anything is read.
#[derive(Debug, Clone)]
pub struct ObjectUploader {
    store: Arc<dyn ObjectStore>,
    timeout_secs: u64,
    max_object_size: u64,
}

impl ObjectUploader {
    pub fn new(store: Arc<dyn ObjectStore>, timeout_secs: u64) -> Self {
        Self {
            store,
            timeout_secs,
            max_object_size: MAX_SINGLE_PUT,
        }
    }

    pub fn with_max_object_size(mut self, max_object_size: u64) -> Self {
        self.max_object_size = max_object_size;
        self
    }

    /// Upload `local_path` and return the object key it was stored under.
    pub async fn upload(&self, local_path: &Path) -> Result<String> {
        let start_time = Instant::now();
        let key = base_name(local_path)?;

        let size = tokio::fs::metadata(local_path).await?.len();
        if size > self.max_object_size {
            return Err(BackupError::Storage(object_store::Error::Generic {
                store: "object upload",
                source: format!(
                    "{} is {} bytes, above the single-request limit of {} bytes",
                    local_path.display(),
                    size,
                    self.max_object_size
                )
                .into(),
            }));
        }

        let data = Bytes::from(tokio::fs::read(local_path).await?);
        let size_bytes = data.len();
        let location = ObjectPath::from(key.as_str());

        with_timeout("object upload", self.timeout_secs, async {
            self.store.put(&location, data.into()).await?;
            Ok(())
        })
        .await?;

        info!(
            file = %local_path.display(),
            key = %key,
            size_bytes,
            elapsed_secs = start_time.elapsed().as_secs(),
            "Uploaded to object storage"
        );
        Ok(key)
    }
}
