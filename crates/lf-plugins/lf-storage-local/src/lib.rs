//! # lf-storage-local
//! lost-found/crates/lf-plugins/lf-storage-local/src/lib.rs
//! Local filesystem implementation of `MediaStore` for report photos.
//! Features: Content-addressable storage and directory sharding.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use lf_core::{MediaStore, StoreError, StoreResult};
use sha2::{Digest, Sha256};
use tokio::fs;

pub struct LocalMediaStore {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/static/uploads")
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Generates a sharded path: "ab/cd/<hash>.<ext>"
    fn sharded_path(&self, media_id: &str) -> PathBuf {
        let mut path = self.root_path.clone();
        path.push(&media_id[0..2]);
        path.push(&media_id[2..4]);
        path.push(media_id);
        path
    }
}

/// File name of an upload: content hash plus an extension from its type.
fn media_id_for(data: &[u8], content_type: &str) -> String {
    let hash = hex::encode(Sha256::digest(data));
    let ext = content_type
        .parse::<mime::Mime>()
        .ok()
        .map(|m| match m.subtype().as_str() {
            "jpeg" => "jpg".to_string(),
            other => other.to_string(),
        })
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{hash}.{ext}")
}

fn io_error(err: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("media storage: {err}"))
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    /// Saves an upload using its SHA-256 hash as the filename.
    /// This automatically deduplicates files.
    async fn save_upload(&self, data: Bytes, content_type: &str) -> StoreResult<String> {
        if data.is_empty() {
            return Err(StoreError::Rejected("empty upload".into()));
        }
        let media_id = media_id_for(&data, content_type);
        let target_path = self.sharded_path(&media_id);

        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        if fs::try_exists(&target_path).await.map_err(io_error)? {
            tracing::debug!(media_id = %media_id, "upload already stored");
        } else {
            fs::write(&target_path, &data).await.map_err(io_error)?;
            tracing::info!(media_id = %media_id, bytes = data.len(), "photo stored");
        }

        Ok(media_id)
    }

    fn url_for(&self, media_id: &str) -> String {
        match (media_id.get(0..2), media_id.get(2..4)) {
            (Some(a), Some(b)) => format!("{}/{a}/{b}/{media_id}", self.url_prefix),
            _ => format!("{}/{media_id}", self.url_prefix),
        }
    }
}
