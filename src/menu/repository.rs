// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! File-backed menu storage.
//!
//! The menu lives in a single JSON file that is the only source of truth.
//! Writes go to a sibling temp file that is synced and renamed over the
//! original, so a reader sees either the old document or the new one.
//!
//! Two locks serialize access:
//! - an in-process `RwLock<()>` between request handlers;
//! - an advisory `fs2` lock on a sibling `.lock` file, so a second process
//!   pointed at the same file (a restarted instance overlapping the old one)
//!   cannot interleave with us.
//!
//! All methods block; call them from `spawn_blocking`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde_json::Value;

use super::{MenuDocument, MenuError};
use crate::security::locks::{resilient_read, resilient_write};
use crate::security::AdminAccess;

/// Default timeout for acquiring the file lock (5 seconds)
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry interval when waiting for lock acquisition
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Reads and replaces the menu document.
pub struct MenuRepository {
    path: PathBuf,
    lock_path: PathBuf,
    temp_path: PathBuf,
    guard: RwLock<()>,
    lock_timeout: Duration,
}

impl MenuRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            lock_path: path.with_extension("lock"),
            temp_path: path.with_extension("tmp"),
            path,
            guard: RwLock::new(()),
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    /// Location of the menu file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored document byte-for-byte.
    ///
    /// The bytes are checked to be valid JSON first; a missing, unreadable or
    /// corrupt file is an error, never a partial result.
    pub fn load_raw(&self) -> Result<Vec<u8>, MenuError> {
        let _guard = resilient_read(&self.guard);
        let _file_lock = self.acquire_lock(LockMode::Shared).map_err(MenuError::Read)?;

        let bytes = fs::read(&self.path).map_err(MenuError::Read)?;
        serde_json::from_slice::<serde::de::IgnoredAny>(&bytes).map_err(MenuError::Corrupt)?;
        Ok(bytes)
    }

    /// Read and parse the stored document.
    pub fn load(&self) -> Result<Value, MenuError> {
        let bytes = self.load_raw()?;
        serde_json::from_slice(&bytes).map_err(MenuError::Corrupt)
    }

    /// Overwrite the stored document with `menu`.
    ///
    /// Requires proof that the caller's session holds the admin flag.
    pub fn replace(&self, _access: &AdminAccess, menu: &MenuDocument) -> Result<(), MenuError> {
        let content = menu
            .to_pretty_json()
            .map_err(|e| MenuError::Write(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let _guard = resilient_write(&self.guard);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(MenuError::Write)?;
        }

        // Held through the rename so no other process sees the temp file half-written.
        let _file_lock = self.acquire_lock(LockMode::Exclusive).map_err(MenuError::Lock)?;

        let result = self.write_and_rename(content.as_bytes());
        if result.is_err() {
            let _ = fs::remove_file(&self.temp_path);
        }
        result.map_err(MenuError::Write)?;

        tracing::info!(
            items = menu.items().len(),
            beverages = menu.beverages().len(),
            "Menu saved"
        );
        Ok(())
    }

    fn write_and_rename(&self, content: &[u8]) -> io::Result<()> {
        {
            let mut temp_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.temp_path)?;
            temp_file.write_all(content)?;
            temp_file.sync_all()?;
        }
        fs::rename(&self.temp_path, &self.path)
    }

    /// Lock the sibling lock file, retrying until `lock_timeout` expires.
    ///
    /// Readers open the lock file read-only and go without a file lock when
    /// it does not exist yet, so reads never need write access to the
    /// directory. The lock is released when the returned handle is dropped.
    fn acquire_lock(&self, mode: LockMode) -> io::Result<Option<File>> {
        let opened = match mode {
            LockMode::Shared => OpenOptions::new().read(true).open(&self.lock_path),
            LockMode::Exclusive => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.lock_path),
        };
        let lock_file = match opened {
            Ok(file) => file,
            Err(e) if matches!(mode, LockMode::Shared) && e.kind() == io::ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };

        let start = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&lock_file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&lock_file),
            };
            match attempt {
                Ok(()) => return Ok(Some(lock_file)),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if start.elapsed() >= self.lock_timeout {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!(
                                "timed out after {:?} waiting for lock on {}",
                                self.lock_timeout,
                                self.lock_path.display()
                            ),
                        ));
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
