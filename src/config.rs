// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runtime configuration.
//!
//! Everything is read from the process environment. The binary seeds the
//! environment from a `.env` file first (see `main.rs`), so deployments can
//! keep credentials out of the command line.
//!
//! | Variable | Default |
//! |---|---|
//! | `PORT` | `3000` |
//! | `BIND_ADDRESS` | `127.0.0.1` |
//! | `ADMIN_USER` / `ADMIN_PASS` | unset, admin login disabled |
//! | `DEMO_USER` / `DEMO_PASS` | `demo` / `demo` |
//! | `SESSION_SECRET` | `dev-secret-change-in-production` |
//! | `SESSION_COOKIE_NAME` | `menu_admin.sid` |
//! | `COOKIE_SECURE` | `false` |
//! | `MENU_PATH` | `data/menu.json` |
//! | `UPLOAD_DIR` | `demos/img/fastfood` |
//! | `UPLOAD_PUBLIC_PREFIX` | `img/fastfood` |

use std::collections::HashMap;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use crate::security::Credentials;
use crate::upload::MAX_UPLOAD_BYTES;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Session secret used when `SESSION_SECRET` is not set. Only fit for development.
pub const DEV_SESSION_SECRET: &str = "dev-secret-change-in-production";

/// Sessions live for 8 hours after issuance.
pub const SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port to listen on.
    pub port: u16,
    /// Address to bind to (defaults to 127.0.0.1).
    pub bind_address: String,
    /// Admin credentials. `None` disables admin login entirely.
    pub admin: Option<Credentials>,
    /// Demo viewer credentials.
    pub demo: Credentials,
    /// Key for signing session cookies.
    pub session_secret: String,
    /// Session lifetime, counted from issuance.
    pub session_ttl: Duration,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Add the `Secure` attribute to the session cookie.
    pub cookie_secure: bool,
    /// Location of the menu document.
    pub menu_path: PathBuf,
    /// Directory uploaded images are written to.
    pub upload_dir: PathBuf,
    /// Prefix of the path reported back to the admin page for an upload.
    pub upload_public_prefix: String,
    /// Largest accepted image, in bytes.
    pub max_upload_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: "127.0.0.1".to_string(),
            admin: None,
            demo: Credentials::new("demo", "demo"),
            session_secret: DEV_SESSION_SECRET.to_string(),
            session_ttl: SESSION_TTL,
            cookie_name: "menu_admin.sid".to_string(),
            cookie_secure: false,
            menu_path: PathBuf::from("data/menu.json"),
            upload_dir: PathBuf::from("demos/img/fastfood"),
            upload_public_prefix: "img/fastfood".to_string(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit key/value map.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_source(|key| vars.get(key).cloned())
    }

    fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let admin = match (var("ADMIN_USER"), var("ADMIN_PASS")) {
            (Some(user), Some(pass)) => Some(Credentials::new(user, pass)),
            _ => {
                warn!("ADMIN_USER/ADMIN_PASS not set, admin login is disabled");
                None
            }
        };

        let demo = Credentials::new(
            var("DEMO_USER").unwrap_or_else(|| defaults.demo.username().to_string()),
            var("DEMO_PASS").unwrap_or_else(|| "demo".to_string()),
        );

        let session_secret = var("SESSION_SECRET").unwrap_or_else(|| {
            warn!("SESSION_SECRET not set, using the development secret");
            DEV_SESSION_SECRET.to_string()
        });

        Ok(Self {
            port: parse_or(var("PORT"), "PORT", defaults.port)?,
            bind_address: var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            admin,
            demo,
            session_secret,
            session_ttl: defaults.session_ttl,
            cookie_name: var("SESSION_COOKIE_NAME").unwrap_or(defaults.cookie_name),
            cookie_secure: parse_or(var("COOKIE_SECURE"), "COOKIE_SECURE", defaults.cookie_secure)?,
            menu_path: var("MENU_PATH").map(PathBuf::from).unwrap_or(defaults.menu_path),
            upload_dir: var("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            upload_public_prefix: var("UPLOAD_PUBLIC_PREFIX")
                .unwrap_or(defaults.upload_public_prefix),
            max_upload_bytes: defaults.max_upload_bytes,
        })
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.bind_address = addr.into();
        self
    }

    /// Set the admin credentials.
    pub fn with_admin(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin = Some(Credentials::new(username, password));
        self
    }

    /// Point menu and upload storage at the given locations.
    pub fn with_storage(mut self, menu_path: impl Into<PathBuf>, upload_dir: impl Into<PathBuf>) -> Self {
        self.menu_path = menu_path.into();
        self.upload_dir = upload_dir.into();
        self
    }

    /// Whether the development session secret is in use.
    pub fn uses_dev_secret(&self) -> bool {
        self.session_secret == DEV_SESSION_SECRET
    }
}

/// Seed the process environment from an env file.
///
/// Returns `Ok(false)` when the file does not exist. A file that exists but
/// cannot be read or parsed is an error. Variables already present in the
/// environment keep their values.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(dotenvy::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(anyhow!("Failed to load environment file {}: {}", path.display(), e)),
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {} value {:?}: {}", key, raw, e)),
        None => {
            info!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}
