// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! menu-admin - Admin backend for a restaurant menu site
//!
//! A single admin edits the menu document and uploads item images through a
//! small JSON API. A separate demo login only gates a preview page.
//!
//! # Core Modules
//!
//! - [`config`] - Environment-driven configuration
//! - [`security`] - Credentials, sessions and the signed session cookie
//! - [`menu`] - Menu validation and atomic storage
//! - [`upload`] - Image type/size checks and collision-free storage
//! - [`server`] - HTTP routes
//! - [`errors`] - API error responses

pub mod config;
pub mod errors;
pub mod menu;
pub mod security;
pub mod server;
pub mod upload;
pub mod utils;

pub use config::AppConfig;
pub use errors::ApiError;
pub use menu::{MenuDocument, MenuError, MenuRepository, MenuValidationError, MENU_ITEM_COUNT};
pub use security::{AdminAccess, SessionContext, SessionCookie, SessionFlag, SessionStore};
pub use server::{router, AppState, Server};
pub use upload::{StoredUpload, UploadError, UploadStore, MAX_UPLOAD_BYTES};
