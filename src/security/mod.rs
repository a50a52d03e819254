// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authentication and sessions.
//!
//! - [`credentials`]: the configured admin and demo username/password pairs
//! - [`session_store`]: token → flags map with an 8 hour lifetime
//! - [`cookie`]: signed `HttpOnly` cookie carrying the token
//! - [`guard`]: per-request [`SessionContext`] and the [`AdminAccess`] capability
//! - [`locks`]: poisoning-tolerant lock helpers
//!
//! ```no_run
//! use std::time::Duration;
//! use menu_admin::security::{SessionFlag, SessionStore};
//!
//! let store = SessionStore::new(Duration::from_secs(8 * 60 * 60));
//! let token = store.create();
//! store.set_flag(&token, SessionFlag::Admin);
//! assert!(store.flags(&token).unwrap().admin);
//! ```

pub mod cookie;
pub mod credentials;
pub mod guard;
pub mod locks;
pub mod session_store;

pub use cookie::SessionCookie;
pub use credentials::Credentials;
pub use guard::{AdminAccess, SessionContext};
pub use locks::{resilient_read, resilient_write};
pub use session_store::{SessionEvent, SessionFlag, SessionFlags, SessionStore};
