use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::error::StorageError;
use crate::sanitize::{file_extension, sanitize_file_name};

const DEFAULT_EXTENSION: &str = "pdf";
const MAX_NAME_ATTEMPTS: usize = 16;

/// A document written to the upload directory.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Absolute or configured-relative path of the stored file.
    pub path: PathBuf,
    /// Client name after sanitizing, kept for display.
    pub original_name: String,
}

/// Durable storage for uploaded voter-list documents.
#[derive(Debug, Clone)]
pub struct UploadStore {
    directory: PathBuf,
}

impl UploadStore {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes `content` under a fresh `upload-{millis}-{uuid}.{ext}` name.
    pub fn persist(&self, original_name: &str, content: &[u8]) -> Result<StoredUpload, StorageError> {
        self.ensure_directory()?;

        let display_name =
            sanitize_file_name(original_name).unwrap_or_else(|| "document.pdf".to_string());
        let extension =
            file_extension(&display_name).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

        for _ in 0..MAX_NAME_ATTEMPTS {
            let candidate = self.directory.join(format!(
                "upload-{}-{}.{}",
                Utc::now().timestamp_millis(),
                Uuid::new_v4().simple(),
                extension
            ));

            // create_new is O_CREAT | O_EXCL: an existing file is never overwritten
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(mut file) => {
                    let written = file.write_all(content).and_then(|_| file.sync_all());
                    if let Err(e) = written {
                        let _ = std::fs::remove_file(&candidate);
                        return Err(StorageError::WriteFile {
                            path: candidate,
                            source: e,
                        });
                    }
                    return Ok(StoredUpload {
                        path: candidate,
                        original_name: display_name,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: candidate,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(self.directory.clone()))
    }

    /// Removes a stored document. Returns false if it was already absent.
    pub fn remove(&self, path: &Path) -> Result<bool, StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::RemoveFile {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    fn ensure_directory(&self) -> Result<(), StorageError> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|e| {
                StorageError::CreateDirectory {
                    path: self.directory.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }
}
