// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request extractors.

use std::convert::Infallible;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::{Form, Json};
use serde::Deserialize;

use super::AppState;
use crate::security::SessionContext;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(SessionContext::resolve(&parts.headers, &state.cookie, &state.sessions))
    }
}

/// Whether the request declares an `application/json` body.
///
/// Parameters such as `charset` are ignored.
pub(crate) fn has_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

/// Login form, sent as JSON or urlencoded.
///
/// An unparseable body becomes empty credentials, which then fail the
/// credential check like any other wrong pair.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[async_trait]
impl<S> FromRequest<S> for LoginRequest
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let parsed = if is_form {
            Form::<LoginRequest>::from_request(req, state)
                .await
                .map(|Form(login)| login)
                .ok()
        } else {
            Json::<LoginRequest>::from_request(req, state)
                .await
                .map(|Json(login)| login)
                .ok()
        };

        Ok(parsed.unwrap_or_default())
    }
}
