//! Files served under `/static/uploads`: applicant photos and pass QR codes.
//!
//! Writes go through [`StagedFile`], which deletes the file again unless the
//! caller commits it once the matching database row is in place.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// Prefix of every stored path; `/static/` + path is the public URL.
pub const PUBLIC_PREFIX: &str = "uploads";
pub const PHOTO_DIR: &str = "photos";
pub const QR_CODE_DIR: &str = "qrcodes";
pub const PHOTO_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file writer stopped before finishing: {0}")]
    Interrupted(String),
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_layout(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.root.join(PHOTO_DIR))?;
        std::fs::create_dir_all(self.root.join(QR_CODE_DIR))
    }

    /// Lower-cased extension of an uploaded photo name, if it is an accepted
    /// image type.
    pub fn photo_extension(file_name: &str) -> Option<String> {
        let extension = Path::new(file_name).extension()?.to_str()?.to_lowercase();
        PHOTO_EXTENSIONS
            .contains(&extension.as_str())
            .then_some(extension)
    }

    pub async fn stage_photo(&self, extension: &str, bytes: Vec<u8>) -> Result<StagedFile, MediaError> {
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.root.join(PHOTO_DIR).join(&file_name);
        self.stage(PHOTO_DIR, &file_name, path, None, bytes).await
    }

    /// Writes under a private name; [`StagedFile::commit`] moves it onto
    /// `file_name`. A discarded attempt never touches the published image.
    pub async fn stage_qr_code(&self, file_name: String, png: Vec<u8>) -> Result<StagedFile, MediaError> {
        let directory = self.root.join(QR_CODE_DIR);
        let staging = directory.join(format!(".{}.{}.staged", Uuid::new_v4().simple(), file_name));
        let destination = directory.join(&file_name);
        self.stage(QR_CODE_DIR, &file_name, staging, Some(destination), png)
            .await
    }

    async fn stage(
        &self,
        dir: &'static str,
        file_name: &str,
        path: PathBuf,
        destination: Option<PathBuf>,
        bytes: Vec<u8>,
    ) -> Result<StagedFile, MediaError> {
        let directory = self.root.join(dir);
        let public_path = format!("{PUBLIC_PREFIX}/{dir}/{file_name}");

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&directory, &target, &bytes))
            .await
            .map_err(|e| MediaError::Interrupted(e.to_string()))??;

        tracing::debug!(path = %path.display(), "Staged media file");
        Ok(StagedFile {
            path,
            destination,
            public_path,
            committed: false,
        })
    }

    /// Whether a stored `uploads/...` path currently points at a file.
    pub async fn exists(&self, public_path: &str) -> bool {
        match self.resolve(public_path) {
            Some(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            None => false,
        }
    }

    /// Deletes a previously committed file. Missing files are ignored.
    pub async fn remove(&self, public_path: &str) {
        let Some(path) = self.resolve(public_path) else {
            tracing::warn!(public_path, "Refusing to remove media outside the upload root");
            return;
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed media file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, path = %path.display(), "Failed to remove media file"),
        }
    }

    /// Maps a stored `uploads/...` path back onto the upload root.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let relative = Path::new(public_path).strip_prefix(PUBLIC_PREFIX).ok()?;
        let normal = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        (normal && relative.components().next().is_some()).then(|| self.root.join(relative))
    }
}

fn write_atomically(directory: &Path, target: &Path, bytes: &[u8]) -> Result<(), MediaError> {
    let write_error = |source| MediaError::Write {
        path: target.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(directory).map_err(write_error)?;
    let partial = target.with_extension(format!("{}.partial", Uuid::new_v4().simple()));
    if let Err(source) = std::fs::write(&partial, bytes) {
        let _ = std::fs::remove_file(&partial);
        return Err(write_error(source));
    }
    std::fs::rename(&partial, target).map_err(|source| {
        let _ = std::fs::remove_file(&partial);
        write_error(source)
    })
}

/// A written file that is deleted on drop unless committed.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    /// Final location when the bytes were written under a staging name.
    destination: Option<PathBuf>,
    public_path: String,
    committed: bool,
}

impl StagedFile {
    pub fn public_path(&self) -> &str {
        &self.public_path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publishes the file and returns its stored path. On failure the staged
    /// bytes are discarded.
    pub fn commit(mut self) -> Result<String, MediaError> {
        if let Some(destination) = self.destination.take() {
            std::fs::rename(&self.path, &destination).map_err(|source| MediaError::Write {
                path: destination.clone(),
                source,
            })?;
            self.path = destination;
        }
        self.committed = true;
        Ok(std::mem::take(&mut self.public_path))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Discarded staged media file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Failed to discard staged media file")
            }
        }
    }
}

/// Public URL for a stored `uploads/...` path.
pub fn public_url(stored_path: &str) -> String {
    format!("/static/{stored_path}")
}

/// Media store over a temporary root that lives as long as the guard.
#[cfg(test)]
pub(crate) fn scratch_media() -> (MediaStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    (MediaStore::new(dir.path()), dir)
}
