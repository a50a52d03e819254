// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Image uploads for menu items.
//!
//! One image per request, in the multipart field `image`. Checks run in
//! this order and the first failure wins:
//!
//! 1. content type is JPEG, PNG or WEBP (nothing is written otherwise);
//! 2. size is at most 5 MiB (the partial temp file is removed otherwise);
//! 3. the stored name is derived from the original one, see [`derive_filename`].
//!
//! Files land in one fixed directory and are never overwritten.

mod multipart;
mod store;

pub use multipart::{receive_image, IMAGE_FIELD};
pub use store::{PendingUpload, StoredUpload, UploadStore};

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::utils::now_millis;

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Largest accepted image: 5 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 5 * BYTES_PER_MIB;

/// Accepted image content types.
pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Why an upload was refused.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Only JPEG, PNG or WEBP images are allowed (image/jpeg, image/png, image/webp).")]
    UnsupportedType { content_type: Option<String> },

    #[error("File exceeds the {} MiB limit.", .limit / BYTES_PER_MIB)]
    TooLarge { limit: u64 },

    #[error("No file received.")]
    NoFile,

    #[error("Unexpected file field: {0}")]
    UnexpectedField(String),

    #[error("Malformed upload: {0}")]
    Malformed(String),

    #[error("failed to store upload: {0}")]
    Storage(#[source] io::Error),
}

/// Reject anything but the allowed image types.
///
/// Parameters such as `; charset=...` are ignored; the comparison is on the
/// media type alone, case-insensitively.
pub fn check_content_type(content_type: Option<&str>) -> Result<(), UploadError> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    match essence {
        Some(ct) if ALLOWED_CONTENT_TYPES.contains(&ct.as_str()) => Ok(()),
        _ => Err(UploadError::UnsupportedType {
            content_type: content_type.map(str::to_string),
        }),
    }
}

/// Derive the stored file name from the client's file name.
///
/// - only the last path component is used (both `/` and `\` separate);
/// - the extension is whatever follows the last `.` (a leading dot does not
///   start an extension), lowercased, with non-alphanumerics dropped;
/// - in the rest, every character outside `[a-zA-Z0-9_-]` becomes `-`, and
///   the result is lowercased (`upload` if nothing is left);
/// - `-<stamp>` goes between the two.
///
/// The output never contains a path separator or a `..` component.
///
/// ```
/// use menu_admin::upload::derive_filename;
///
/// assert_eq!(derive_filename("Doble Cheddar.JPG", 1700000000000), "doble-cheddar-1700000000000.jpg");
/// assert_eq!(derive_filename("../../etc/passwd", 7), "passwd-7");
/// ```
pub fn derive_filename(original: &str, stamp: u64) -> String {
    let base = original
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let (stem, extension) = match base.rfind('.') {
        Some(dot) if dot > 0 => (&base[..dot], &base[dot + 1..]),
        _ => (base, ""),
    };

    let mut stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if stem.is_empty() {
        stem.push_str("upload");
    }

    let extension: String = extension
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if extension.is_empty() {
        format!("{}-{}", stem, stamp)
    } else {
        format!("{}-{}.{}", stem, stamp, extension)
    }
}

/// Strictly increasing millisecond stamps.
///
/// Normally the wall clock in milliseconds; when two uploads land in the same
/// millisecond (or the clock steps back) the previous value plus one is used.
#[derive(Debug, Default)]
pub struct StampSource {
    last: AtomicU64,
}

impl StampSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = now_millis();
        let mut previous = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(previous + 1);
            match self
                .last
                .compare_exchange(previous, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }
}
