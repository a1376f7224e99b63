use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::model::global_error::{AppError, ErrorCode};

/// Local blob store for uploaded images (bug attachments, avatars).
///
/// Files land under `<root>/<category>/<year>/<month>/` with a generated
/// name; the returned URL path is what gets persisted on the owning row.
/// There is no retry and no integrity check: the write succeeds or the
/// request fails.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn save(
        &self,
        category: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let relative = format!(
            "{category}/{}/{:02}/{}.{ext}",
            now.year(),
            now.month(),
            Uuid::new_v4().simple()
        );

        let full_path = self.root.join(&relative);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|err| {
                tracing::error!("failed to create upload directory: {err}");
                AppError::new(ErrorCode::StorageError)
            })?;
        }

        fs::write(&full_path, bytes).await.map_err(|err| {
            tracing::error!("failed to write uploaded file: {err}");
            AppError::new(ErrorCode::StorageError)
        })?;

        Ok(format!("/media/{relative}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_writes_file_and_returns_url_path() {
        let dir = std::env::temp_dir().join(format!("bugtrap-store-{}", Uuid::new_v4()));
        let store = BlobStore::new(&dir);

        let url = store.save("bug_attachments", "shot.png", b"fakepng").await.unwrap();

        assert!(url.starts_with("/media/bug_attachments/"));
        assert!(url.ends_with(".png"));

        let on_disk = dir.join(url.trim_start_matches("/media/"));
        assert_eq!(fs::read(on_disk).await.unwrap(), b"fakepng");

        fs::remove_dir_all(dir).await.ok();
    }

    #[tokio::test]
    async fn avatar_uploads_land_under_avatars() {
        let dir = std::env::temp_dir().join(format!("bugtrap-store-{}", Uuid::new_v4()));
        let store = BlobStore::new(&dir);

        let url = store.save("avatars", "me.jpg", b"jpegdata").await.unwrap();
        assert!(url.starts_with("/media/avatars/"));
        assert!(url.ends_with(".jpg"));

        fs::remove_dir_all(dir).await.ok();
    }

    #[tokio::test]
    async fn unknown_extension_falls_back_to_bin() {
        let dir = std::env::temp_dir().join(format!("bugtrap-store-{}", Uuid::new_v4()));
        let store = BlobStore::new(&dir);

        let url = store.save("avatars", "noext", b"data").await.unwrap();
        assert!(url.ends_with(".bin"));

        fs::remove_dir_all(dir).await.ok();
    }
}
