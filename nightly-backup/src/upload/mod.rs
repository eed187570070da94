//! Remote storage for the final bundle.
//!
//! Both destinations sit behind [`object_store::ObjectStore`]: the primary
//! bucket gets a single `put` of the bundle, the optional cold-archive vault
//! picks a direct or multipart transfer by file size.

pub mod object;
pub mod vault;

use std::path::Path;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;

use crate::config::StoreBackend;
use crate::utils::errors::{BackupError, Result};

pub use object::ObjectUploader;
pub use vault::{select_strategy, UploadStrategy, VaultArchive, VaultUploader};

/// Build an object store client for `backend`.
///
/// No request is made here; bad credentials surface on the first upload.
pub fn build_store(backend: &StoreBackend) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match backend {
        StoreBackend::Local { path } => {
            std::fs::create_dir_all(path)?;
            Arc::new(
                LocalFileSystem::new_with_prefix(path)
                    .map_err(|e| BackupError::Config(e.to_string()))?,
            )
        }

        StoreBackend::S3 {
            endpoint,
            access_key,
            secret_key,
            bucket,
            region,
            virtual_hosted_style,
        } => {
            let builder = AmazonS3Builder::new()
                .with_endpoint(endpoint)
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key)
                .with_bucket_name(bucket)
                .with_region(region.as_deref().unwrap_or("us-east-1"))
                .with_virtual_hosted_style_request(*virtual_hosted_style)
                .with_allow_http(endpoint.starts_with("http://"));

            Arc::new(
                builder
                    .build()
                    .map_err(|e| BackupError::Config(e.to_string()))?,
            )
        }
    };

    Ok(store)
}

/// Last path component of `path`, used as the remote key.
pub(crate) fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| BackupError::FileNotFound(path.to_path_buf()))
}
