// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-request session context and the admin capability.
//!
//! Protected operations ([`crate::menu::MenuRepository::replace`],
//! [`crate::upload::UploadStore::begin`]) take an [`AdminAccess`]. Outside
//! this crate the only way to get one is [`SessionContext::require_admin`],
//! so every protected call site visibly depends on the session check.

use axum::http::HeaderMap;

use super::cookie::SessionCookie;
use super::session_store::{SessionFlags, SessionStore};
use crate::errors::ApiError;

/// Proof that the current request's session holds the admin flag.
#[derive(Debug)]
pub struct AdminAccess {
    _private: (),
}

impl AdminAccess {
    pub(crate) fn granted() -> Self {
        Self { _private: () }
    }
}

/// The session, if any, attached to one request.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    token: Option<String>,
    flags: SessionFlags,
}

impl SessionContext {
    /// Resolve the request's cookie against the store.
    ///
    /// A missing, tampered, unknown or expired cookie yields an anonymous
    /// context. Nothing is created or modified.
    pub fn resolve(headers: &HeaderMap, cookie: &SessionCookie, store: &SessionStore) -> Self {
        cookie
            .token_from_headers(headers)
            .and_then(|token| store.flags(&token).map(|flags| Self { token: Some(token), flags }))
            .unwrap_or_default()
    }

    /// Token of the live session, if there is one.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.flags.admin
    }

    pub fn is_demo(&self) -> bool {
        self.flags.demo
    }

    /// Admin capability for `operation`, or 401.
    pub fn require_admin(&self, operation: &str) -> Result<AdminAccess, ApiError> {
        if self.flags.admin {
            Ok(AdminAccess::granted())
        } else {
            Err(ApiError::unauthorized(operation))
        }
    }
}
