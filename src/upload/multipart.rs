// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pulling the image out of a multipart request.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;

use super::{check_content_type, StoredUpload, UploadError, UploadStore};
use crate::security::AdminAccess;

/// Name of the multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Store the single image in `multipart`.
///
/// Text fields are ignored. A file under any other field name, or a second
/// image, fails the whole request and removes anything already stored by it.
pub async fn receive_image(
    store: &UploadStore,
    access: &AdminAccess,
    mut multipart: Multipart,
) -> Result<StoredUpload, UploadError> {
    let mut stored: Option<StoredUpload> = None;

    let outcome = loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break Ok(()),
            Err(e) => break Err(multipart_error(e, store.max_bytes())),
        };

        // Parts without a file name are plain form values.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let name = field.name().unwrap_or_default().to_string();
        if name != IMAGE_FIELD || stored.is_some() {
            break Err(UploadError::UnexpectedField(name));
        }

        match receive_field(store, access, field, &file_name).await {
            Ok(upload) => stored = Some(upload),
            Err(e) => break Err(e),
        }
    };

    match outcome {
        Ok(()) => stored.ok_or(UploadError::NoFile),
        Err(e) => {
            if let Some(upload) = stored {
                store.discard(&upload).await;
            }
            Err(e)
        }
    }
}

async fn receive_field(
    store: &UploadStore,
    access: &AdminAccess,
    mut field: Field<'_>,
    file_name: &str,
) -> Result<StoredUpload, UploadError> {
    check_content_type(field.content_type())?;

    let mut pending = store.begin(access, file_name).await?;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if let Err(e) = pending.write_chunk(&chunk).await {
                    pending.abort().await;
                    return Err(e);
                }
            }
            Ok(None) => break,
            Err(e) => {
                pending.abort().await;
                return Err(multipart_error(e, store.max_bytes()));
            }
        }
    }
    pending.commit().await
}

/// The transport-level body limit surfaces as a multipart error; report it as
/// the same size failure the store would have raised.
fn multipart_error(err: MultipartError, limit: u64) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge { limit }
    } else {
        UploadError::Malformed(err.body_text())
    }
}
