// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Upload directory.
//!
//! Incoming bytes are streamed into a hidden temp file in the upload
//! directory. Commit hard-links the temp file to its final name, which fails
//! instead of overwriting if the name is taken, then removes the temp file.
//! A pending upload that is dropped without a commit (size limit tripped,
//! client went away) deletes its temp file.

use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{derive_filename, StampSource, UploadError};
use crate::security::AdminAccess;

/// Attempts at finding an unused final name before giving up.
const MAX_NAME_ATTEMPTS: usize = 5;

/// The fixed directory uploaded images go to.
pub struct UploadStore {
    dir: PathBuf,
    public_prefix: String,
    max_bytes: u64,
    stamps: StampSource,
}

/// A file that was committed to the upload directory.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Final file name inside the upload directory.
    pub filename: String,
    /// Path the admin page can use directly, e.g. `img/fastfood/burger-1700000000000.png`.
    pub public_path: String,
    location: PathBuf,
}

impl StoredUpload {
    /// Location on disk.
    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: impl Into<String>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.into(),
            max_bytes,
            stamps: StampSource::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Path reported to the client for a stored file name.
    pub fn public_path(&self, filename: &str) -> String {
        let prefix = self.public_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", prefix, filename)
        }
    }

    /// Open a temp file for an upload whose client-side name is `original_name`.
    pub async fn begin(
        &self,
        _access: &AdminAccess,
        original_name: &str,
    ) -> Result<PendingUpload<'_>, UploadError> {
        fs::create_dir_all(&self.dir).await.map_err(UploadError::Storage)?;

        let nonce: u32 = rand::thread_rng().gen();
        let temp_path = self
            .dir
            .join(format!(".upload-{}-{:08x}.part", self.stamps.next(), nonce));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .map_err(UploadError::Storage)?;

        Ok(PendingUpload {
            store: self,
            file: Some(file),
            temp_path,
            original_name: original_name.to_string(),
            written: 0,
            finished: false,
        })
    }

    /// Remove a file committed earlier in the same request.
    pub async fn discard(&self, stored: &StoredUpload) {
        if let Err(e) = fs::remove_file(&stored.location).await {
            tracing::warn!(file = %stored.filename, error = %e, "Failed to remove discarded upload");
        }
    }
}

/// An upload being streamed to disk.
pub struct PendingUpload<'a> {
    store: &'a UploadStore,
    file: Option<File>,
    temp_path: PathBuf,
    original_name: String,
    written: u64,
    finished: bool,
}

impl PendingUpload<'_> {
    /// Append a chunk, refusing it if it would cross the size limit.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        let total = self.written + chunk.len() as u64;
        if total > self.store.max_bytes {
            return Err(UploadError::TooLarge {
                limit: self.store.max_bytes,
            });
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| UploadError::Storage(io::Error::other("upload already closed")))?;
        file.write_all(chunk).await.map_err(UploadError::Storage)?;
        self.written = total;
        Ok(())
    }

    /// Give up on the upload and delete what was written.
    pub async fn abort(mut self) {
        self.file.take();
        self.finished = true;
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            tracing::warn!(error = %e, "Failed to remove partial upload");
        }
    }

    /// Flush to disk and move the file to its final name.
    pub async fn commit(mut self) -> Result<StoredUpload, UploadError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(UploadError::Storage)?;
            file.sync_all().await.map_err(UploadError::Storage)?;
        }

        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = derive_filename(&self.original_name, self.store.stamps.next());
            let location = self.store.dir.join(&filename);

            match fs::hard_link(&self.temp_path, &location).await {
                Ok(()) => {
                    self.finished = true;
                    if let Err(e) = fs::remove_file(&self.temp_path).await {
                        tracing::warn!(error = %e, "Failed to remove upload temp file");
                    }
                    tracing::info!(file = %filename, bytes = self.written, "Image stored");
                    return Ok(StoredUpload {
                        public_path: self.store.public_path(&filename),
                        filename,
                        location,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(file = %filename, "Upload name taken, trying another stamp");
                }
                Err(e) => return Err(UploadError::Storage(e)),
            }
        }

        Err(UploadError::Storage(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no free file name for upload",
        )))
    }
}

impl Drop for PendingUpload<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.file.take();
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
