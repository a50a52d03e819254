// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP-facing errors.
//!
//! Every failing request ends as one [`ApiError`]. Clients get a JSON body
//! `{"error": "..."}` with a short message:
//!
//! - authentication and authorization failures are generic and never say
//!   which credential field was wrong;
//! - validation failures are specific and actionable;
//! - storage failures are generic and carry a `reference` code. The
//!   underlying I/O error is only written to the log, with paths redacted.

use std::fmt::Display;
use std::sync::LazyLock;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rand::Rng;
use regex::Regex;
use serde::Serialize;

use crate::menu::{MenuError, MenuValidationError};
use crate::upload::UploadError;

/// Message for a failed admin login.
pub const ADMIN_LOGIN_FAILED: &str = "Invalid username or password.";

/// Message for a failed demo login.
pub const DEMO_LOGIN_FAILED: &str = "Invalid credentials.";

/// Message for a protected operation without an admin session.
pub const UNAUTHORIZED: &str = "Not authorized. Please sign in first.";

/// Generate a support reference code.
/// Format: ERR-YYYYMMDD-XXXXXX (e.g., ERR-20240115-A3F8K2)
pub fn generate_reference_code() -> String {
    let date = Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".chars().collect();
    let random: String = (0..6)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect();
    format!("ERR-{}-{}", date, random)
}

/// Error kinds surfaced to HTTP clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Bad credentials on a login endpoint (401).
    AuthenticationFailed { message: &'static str },
    /// Protected operation without an admin session (401).
    Unauthorized,
    /// Malformed menu or rejected upload (400).
    Validation { message: String },
    /// Read/write failure on the menu file or upload directory (500).
    Storage { message: &'static str, reference: String },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<&'a str>,
}

impl ApiError {
    /// Failed login, logged without the submitted password.
    pub fn authentication_failed(message: &'static str, username: &str) -> Self {
        tracing::warn!(username = %username, "Login attempt rejected");
        Self::AuthenticationFailed { message }
    }

    /// Protected operation attempted without the admin flag.
    pub fn unauthorized(operation: &str) -> Self {
        tracing::warn!(operation = %operation, "Protected operation without admin session");
        Self::Unauthorized
    }

    /// Client-side validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::info!(reason = %message, "Request rejected by validation");
        Self::Validation { message }
    }

    /// Storage failure. Full details are logged, never returned.
    pub fn storage(message: &'static str, internal_error: &dyn Display) -> Self {
        let reference = generate_reference_code();
        let sanitized = sanitize_error_details(&internal_error.to_string());

        tracing::error!(
            reference = %reference,
            internal_error = %sanitized,
            "{}", message
        );

        Self::Storage { message, reference }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthenticationFailed { .. } | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-facing message.
    pub fn message(&self) -> &str {
        match self {
            ApiError::AuthenticationFailed { message } => message,
            ApiError::Unauthorized => UNAUTHORIZED,
            ApiError::Validation { message } => message,
            ApiError::Storage { message, .. } => message,
        }
    }

    /// Reference code, present for storage failures only.
    pub fn reference(&self) -> Option<&str> {
        match self {
            ApiError::Storage { reference, .. } => Some(reference),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.status_code())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message(),
            reference: self.reference(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<MenuValidationError> for ApiError {
    fn from(err: MenuValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<MenuError> for ApiError {
    fn from(err: MenuError) -> Self {
        match err {
            MenuError::Invalid(invalid) => invalid.into(),
            MenuError::Read(source) => ApiError::storage("Could not read the menu.", &source),
            MenuError::Corrupt(source) => ApiError::storage("Could not read the menu.", &source),
            MenuError::Write(source) => ApiError::storage("Could not save the menu.", &source),
            MenuError::Lock(source) => ApiError::storage("Could not save the menu.", &source),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Storage(source) => {
                ApiError::storage("Could not store the uploaded file.", &source)
            }
            other => ApiError::validation(other.to_string()),
        }
    }
}

/// Patterns for redacting file system paths from logged error details.
static SANITIZE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"[A-Za-z]:\\[^\s]+").expect("Windows path regex"), "[PATH_REDACTED]"),
        (
            Regex::new(r"/(?:home|usr|var|etc|opt|tmp|root|srv)/[^\s]+").expect("Unix path regex"),
            "[PATH_REDACTED]",
        ),
    ]
});

/// Redact file system paths from an error string before logging it.
pub fn sanitize_error_details(details: &str) -> String {
    SANITIZE_PATTERNS
        .iter()
        .fold(details.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}
