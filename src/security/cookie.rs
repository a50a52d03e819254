// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session cookie transport.
//!
//! The cookie value is `<token>.<signature>`, where the signature is the hex
//! HMAC-SHA256 of the token under the session secret. A value whose signature
//! does not verify is treated as if no cookie had been sent.

use std::time::Duration;

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs session tokens and formats the session cookie.
#[derive(Clone)]
pub struct SessionCookie {
    name: String,
    mac: HmacSha256,
    secure: bool,
}

impl SessionCookie {
    /// Keyed by `secret`. Fails only if the MAC rejects the key.
    pub fn new(name: impl Into<String>, secret: &str, secure: bool) -> Result<Self, InvalidLength> {
        Ok(Self {
            name: name.into(),
            mac: HmacSha256::new_from_slice(secret.as_bytes())?,
            secure,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Produce the cookie value for a token.
    pub fn sign(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{}.{}", token, signature)
    }

    /// Recover the token from a cookie value, if the signature verifies.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (token, signature) = value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(token.to_string())
    }

    /// Find this cookie in the request headers and return its verified token.
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| *name == self.name)
            .find_map(|(_, value)| self.verify(value.trim().trim_matches('"')))
    }

    /// `Set-Cookie` value carrying a token for the given remaining lifetime.
    pub fn issue(&self, token: &str, max_age: Duration) -> String {
        self.render(&self.sign(token), max_age.as_secs())
    }

    /// `Set-Cookie` value that makes the browser drop the cookie.
    pub fn clear(&self) -> String {
        self.render("", 0)
    }

    fn render(&self, value: &str, max_age_secs: u64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.name, value, max_age_secs
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}
