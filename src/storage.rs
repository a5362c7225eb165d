use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use uuid::Uuid;

/// A file received from a multipart form, before it has a stored name.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub original_name: String,
    pub bytes: Bytes,
}

/// Saves, deletes and replaces product images under one directory.
///
/// Stored names are generated (UUIDv4 + sanitized extension), never the
/// client-supplied name. The file write and the corresponding row write are
/// not coordinated; a crash between them can leave an orphaned file or a
/// dangling reference.
#[derive(Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the upload directory if it is missing. Called once at startup.
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Write an uploaded file under a fresh generated name and return it.
    ///
    /// An absent upload, or one whose original name is empty (a form with an
    /// untouched file input), yields `None` without touching the disk.
    pub async fn save(&self, upload: Option<&UploadedImage>) -> io::Result<Option<String>> {
        let Some(upload) = upload.filter(|u| !u.original_name.is_empty()) else {
            return Ok(None);
        };

        let name = match safe_extension(&upload.original_name) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        tokio::fs::write(self.root.join(&name), &upload.bytes).await?;
        Ok(Some(name))
    }

    /// Remove a stored file. Idempotent: `None` or an already-absent file is
    /// a silent no-op.
    pub async fn delete(&self, filename: Option<&str>) -> io::Result<()> {
        let Some(filename) = filename else {
            return Ok(());
        };
        match tokio::fs::remove_file(self.root.join(filename)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Swap the stored file when a new upload is present, otherwise keep the
    /// current name. Used by product edit.
    pub async fn replace(
        &self,
        upload: Option<&UploadedImage>,
        current: Option<&str>,
    ) -> io::Result<Option<String>> {
        let has_new = upload.is_some_and(|u| !u.original_name.is_empty());
        if !has_new {
            return Ok(current.map(str::to_string));
        }
        self.delete(current).await?;
        self.save(upload).await
    }
}

/// Extension of the client-supplied name, reduced to ASCII alphanumerics and
/// lowercased. Everything else about the stored name is generated, so this is
/// the only user-influenced fragment that reaches the filesystem.
fn safe_extension(original: &str) -> Option<String> {
    let ext = Path::new(original).extension()?.to_str()?;
    let cleaned: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(16)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, data: &[u8]) -> UploadedImage {
        UploadedImage {
            original_name: name.to_string(),
            bytes: Bytes::copy_from_slice(data),
        }
    }

    fn store() -> (tempfile::TempDir, ImageStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ImageStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn save_generates_fresh_name_and_keeps_extension() {
        let (_dir, store) = store();
        let img = upload("foto vacaciones.PNG", b"png-bytes");

        let name = store.save(Some(&img)).await.unwrap().expect("stored name");
        assert_ne!(name, img.original_name);
        assert!(name.ends_with(".png"));
        assert_eq!(
            tokio::fs::read(store.root().join(&name)).await.unwrap(),
            b"png-bytes"
        );
    }

    #[tokio::test]
    async fn save_without_upload_is_a_no_op() {
        let (dir, store) = store();

        assert_eq!(store.save(None).await.unwrap(), None);
        assert_eq!(store.save(Some(&upload("", b"x"))).await.unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn save_handles_names_without_usable_extension() {
        let (_dir, store) = store();

        let name = store
            .save(Some(&upload("archivo", b"data")))
            .await
            .unwrap()
            .expect("stored name");
        assert!(!name.contains('.'));
        assert!(store.root().join(&name).exists());
    }

    #[tokio::test]
    async fn save_sanitizes_hostile_extensions() {
        let (_dir, store) = store();

        let name = store
            .save(Some(&upload("x.p/../ng", b"data")))
            .await
            .unwrap()
            .expect("stored name");
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
        assert!(store.root().join(&name).exists());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = store();
        let name = store
            .save(Some(&upload("a.jpg", b"j")))
            .await
            .unwrap()
            .unwrap();

        store.delete(Some(&name)).await.unwrap();
        assert!(!store.root().join(&name).exists());
        store.delete(Some(&name)).await.unwrap();
        store.delete(Some("nunca-existio.jpg")).await.unwrap();
        store.delete(None).await.unwrap();
    }

    #[tokio::test]
    async fn replace_without_new_upload_keeps_current_file() {
        let (_dir, store) = store();
        let current = store
            .save(Some(&upload("a.jpg", b"old")))
            .await
            .unwrap()
            .unwrap();

        let kept = store.replace(None, Some(&current)).await.unwrap();
        assert_eq!(kept.as_deref(), Some(current.as_str()));
        assert!(store.root().join(&current).exists());

        let kept = store
            .replace(Some(&upload("", b"")), Some(&current))
            .await
            .unwrap();
        assert_eq!(kept.as_deref(), Some(current.as_str()));
        assert!(store.root().join(&current).exists());
    }

    #[tokio::test]
    async fn replace_with_new_upload_swaps_files() {
        let (_dir, store) = store();
        let old = store
            .save(Some(&upload("a.jpg", b"old")))
            .await
            .unwrap()
            .unwrap();

        let fresh = store
            .replace(Some(&upload("b.webp", b"new")), Some(&old))
            .await
            .unwrap()
            .expect("new name");
        assert_ne!(fresh, old);
        assert!(fresh.ends_with(".webp"));
        assert!(!store.root().join(&old).exists());
        assert_eq!(
            tokio::fs::read(store.root().join(&fresh)).await.unwrap(),
            b"new"
        );
    }

    #[tokio::test]
    async fn replace_with_no_current_image_just_saves() {
        let (_dir, store) = store();

        let fresh = store
            .replace(Some(&upload("c.png", b"n")), None)
            .await
            .unwrap()
            .expect("new name");
        assert!(store.root().join(&fresh).exists());
    }
}
