//! # Local Media Storage
//!
//! Content-addressed image storage on the local filesystem. Files are named
//! by the SHA-256 of their (optimized) bytes and sharded two levels deep:
//! `ab/cd/abcd…ef.png`. Identical uploads therefore land on one file.
//!
//! Only raster images are accepted; the format is sniffed from the bytes, not
//! trusted from the declared content type. PNGs are losslessly recompressed
//! with oxipng before hashing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::ImageFormat;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use domains::{AppError, MediaStorage, MediaUpload, Result};

pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

pub struct LocalMediaStorage {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root: PathBuf,
    /// Public URL prefix (e.g., "/media")
    url_prefix: String,
    max_bytes: usize,
}

impl LocalMediaStorage {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative_path(hash: &str, extension: &str) -> String {
        format!("{}/{}/{hash}.{extension}", &hash[0..2], &hash[2..4])
    }
}

/// Sniffs the format and returns the bytes to store with their extension.
fn prepare(upload: &MediaUpload) -> Result<(Vec<u8>, &'static str)> {
    if upload.content_type.type_() != mime::IMAGE {
        return Err(AppError::Validation(format!(
            "Unsupported upload type {}",
            upload.content_type
        )));
    }
    let format = image::guess_format(&upload.bytes)
        .map_err(|_| AppError::Validation("Upload is not a recognizable image".into()))?;
    let extension = match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        other => {
            return Err(AppError::Validation(format!(
                "Image format {other:?} is not supported"
            )))
        }
    };

    if format == ImageFormat::Png {
        match oxipng::optimize_from_memory(&upload.bytes, &oxipng::Options::from_preset(2)) {
            Ok(optimized) if optimized.len() < upload.bytes.len() => {
                debug!(before = upload.bytes.len(), after = optimized.len(), "png optimized");
                return Ok((optimized, extension));
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "png optimization failed; storing original"),
        }
    }
    Ok((upload.bytes.to_vec(), extension))
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn store(&self, upload: MediaUpload) -> Result<String> {
        if upload.bytes.len() > self.max_bytes {
            return Err(AppError::Validation(format!(
                "Images must be at most {} bytes",
                self.max_bytes
            )));
        }
        let (data, extension) = tokio::task::spawn_blocking(move || prepare(&upload))
            .await
            .map_err(AppError::internal)??;

        let hash = hex::encode(Sha256::digest(&data));
        let relative = Self::relative_path(&hash, extension);
        let target = self.root.join(&relative);

        if fs::try_exists(&target).await.map_err(AppError::internal)? {
            debug!(%relative, "image already stored");
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await.map_err(AppError::internal)?;
            }
            fs::write(&target, &data).await.map_err(AppError::internal)?;
            debug!(%relative, bytes = data.len(), "image stored");
        }
        Ok(format!("{}/{relative}", self.url_prefix))
    }
}
