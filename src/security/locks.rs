// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lock helpers that recover from poisoning.
//!
//! A handler that panics while holding the session map or the menu write
//! lock poisons it. Refusing every later request over that would turn one bad
//! request into an outage, so these helpers log the event and hand out the
//! guard anyway. The protected data is either a map of plain flags or a unit
//! value guarding a file that is only ever replaced atomically, so nothing
//! half-updated can leak through.
//!
//! ```no_run
//! use std::sync::RwLock;
//! use menu_admin::security::locks::{resilient_read, resilient_write};
//!
//! let lock = RwLock::new(0u32);
//! *resilient_write(&lock) += 1;
//! assert_eq!(*resilient_read(&lock), 1);
//! ```

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "security::locks",
                event = "LOCK_POISONED_READ",
                "RwLock was poisoned during read acquisition, recovering. \
                 A request handler panicked while holding this lock."
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "security::locks",
                event = "LOCK_POISONED_WRITE",
                "RwLock was poisoned during write acquisition, recovering. \
                 A request handler panicked while holding this lock."
            );
            poisoned.into_inner()
        }
    }
}
