// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Small helpers shared across modules.

/// Mask a secret (session token, cookie value) for logging.
///
/// Shows only the first `visible_prefix` characters followed by "...".
/// Values no longer than the prefix are hidden entirely.
///
/// ```
/// use menu_admin::utils::mask_sensitive;
///
/// assert_eq!(mask_sensitive("3f9a1c77e0b2d4", 6), "3f9a1c...");
/// ```
pub fn mask_sensitive(input: &str, visible_prefix: usize) -> String {
    if input.chars().count() <= visible_prefix {
        return "***".to_string();
    }

    let prefix: String = input.chars().take(visible_prefix).collect();
    format!("{}...", prefix)
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
