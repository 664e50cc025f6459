//! Product photo storage on the local filesystem.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::app_error::AppError;

/// Public URL prefix the upload directory is served under.
pub const PUBLIC_PREFIX: &str = "/uploads";

const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
];

#[derive(Clone, Debug)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the photo under a generated name and returns its public path.
    pub async fn save(&self, content_type: Option<&str>, bytes: &[u8]) -> Result<String, AppError> {
        let extension = extension_for(content_type)?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Image is required".into()));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .context("Failed to create upload directory")?;

        let file_name = format!("{}.{extension}", Uuid::new_v4());
        tokio::fs::write(self.dir.join(&file_name), bytes)
            .await
            .context("Failed to write photo")?;

        Ok(format!("{PUBLIC_PREFIX}/{file_name}"))
    }

    /// Best-effort removal; a missing file is not an error.
    pub async fn remove(&self, public_path: &str) {
        let Some(file_name) = public_path
            .strip_prefix(PUBLIC_PREFIX)
            .map(|rest| rest.trim_start_matches('/'))
            .filter(|name| !name.is_empty() && !name.contains(['/', '\\']) && name != &"..")
        else {
            return;
        };

        if let Err(err) = tokio::fs::remove_file(self.dir.join(file_name)).await {
            tracing::warn!("Failed to remove photo {}: {}", public_path, err);
        }
    }
}

fn extension_for(content_type: Option<&str>) -> Result<&'static str, AppError> {
    let content_type = content_type.unwrap_or_default();
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
        .ok_or_else(|| AppError::BadRequest(format!("Unsupported image type {content_type}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> PhotoStore {
        PhotoStore::new(std::env::temp_dir().join(format!("photos-{}", Uuid::new_v4())))
    }

    #[tokio::test]
    async fn saved_photo_can_be_removed() {
        let store = temp_store();
        let path = store.save(Some("image/png"), b"\x89PNG").await.unwrap();
        assert!(path.starts_with("/uploads/"));
        assert!(path.ends_with(".png"));

        let file = store.dir().join(path.trim_start_matches("/uploads/"));
        assert!(file.exists());
        store.remove(&path).await;
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn unsupported_types_are_rejected() {
        let err = temp_store()
            .save(Some("application/x-sh"), b"#!/bin/sh")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn traversal_paths_are_ignored_on_remove() {
        // Must not panic or touch anything outside the upload directory.
        temp_store().remove("/uploads/../Cargo.toml").await;
        temp_store().remove("/etc/passwd").await;
    }
}
