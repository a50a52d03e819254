// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory session store.
//!
//! A session is an opaque token mapped to two independent flags: `admin`
//! (set by `/api/login`) and `demo` (set by `/api/demo-login`). Sessions
//! expire a fixed time after issuance regardless of activity; an expired
//! record reads exactly like an unknown token and is removed by
//! [`SessionStore::cleanup_expired`].

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;

use super::locks::{resilient_read, resilient_write};
use crate::utils::mask_sensitive;

/// Number of random bytes in a session token (hex encoded to twice as many chars).
const TOKEN_BYTES: usize = 32;

/// Which login protocol a flag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlag {
    Admin,
    Demo,
}

impl fmt::Display for SessionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFlag::Admin => write!(f, "admin"),
            SessionFlag::Demo => write!(f, "demo"),
        }
    }
}

/// Authentication state carried by one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub admin: bool,
    pub demo: bool,
}

impl SessionFlags {
    fn set(&mut self, flag: SessionFlag) {
        match flag {
            SessionFlag::Admin => self.admin = true,
            SessionFlag::Demo => self.demo = true,
        }
    }
}

/// Session lifecycle events, logged as audit lines.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Created {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    FlagSet {
        session_id: String,
        flag: SessionFlag,
        timestamp: DateTime<Utc>,
    },
    Destroyed {
        session_id: String,
        timestamp: DateTime<Utc>,
        session_duration_secs: u64,
    },
    Swept {
        removed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Format event for the log. Tokens are masked to a short prefix.
    pub fn to_audit_string(&self) -> String {
        match self {
            SessionEvent::Created { session_id, timestamp } => format!(
                "{} | SESSION_CREATED | session={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                mask_sensitive(session_id, 8)
            ),
            SessionEvent::FlagSet { session_id, flag, timestamp } => format!(
                "{} | SESSION_FLAG_SET | session={} flag={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                mask_sensitive(session_id, 8),
                flag
            ),
            SessionEvent::Destroyed { session_id, timestamp, session_duration_secs } => format!(
                "{} | SESSION_DESTROYED | session={} duration={}s",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                mask_sensitive(session_id, 8),
                session_duration_secs
            ),
            SessionEvent::Swept { removed, timestamp } => format!(
                "{} | SESSION_SWEPT | removed={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                removed
            ),
        }
    }
}

#[derive(Debug, Clone)]
struct SessionRecord {
    created_at: Instant,
    flags: SessionFlags,
}

impl SessionRecord {
    fn remaining(&self, ttl: Duration) -> Option<Duration> {
        ttl.checked_sub(self.created_at.elapsed()).filter(|d| !d.is_zero())
    }
}

/// Thread-safe session map.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    ttl: Duration,
}

impl SessionStore {
    /// Create a store whose sessions live for `ttl` after issuance.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Session lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create an empty session and return its token (64-char hex string).
    pub fn create(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill(&mut bytes);
        let token = hex::encode(bytes);

        resilient_write(&self.sessions).insert(
            token.clone(),
            SessionRecord {
                created_at: Instant::now(),
                flags: SessionFlags::default(),
            },
        );

        let event = SessionEvent::Created {
            session_id: token.clone(),
            timestamp: Utc::now(),
        };
        tracing::info!("{}", event.to_audit_string());

        token
    }

    /// Flags of a live session. `None` for unknown or expired tokens.
    pub fn flags(&self, token: &str) -> Option<SessionFlags> {
        let sessions = resilient_read(&self.sessions);
        sessions
            .get(token)
            .filter(|record| record.remaining(self.ttl).is_some())
            .map(|record| record.flags)
    }

    /// Raise a flag on a live session. Returns false if the token is unknown or expired.
    pub fn set_flag(&self, token: &str, flag: SessionFlag) -> bool {
        let mut sessions = resilient_write(&self.sessions);
        let Some(record) = sessions.get_mut(token) else {
            return false;
        };
        if record.remaining(self.ttl).is_none() {
            return false;
        }
        record.flags.set(flag);

        let event = SessionEvent::FlagSet {
            session_id: token.to_string(),
            flag,
            timestamp: Utc::now(),
        };
        tracing::info!("{}", event.to_audit_string());
        true
    }

    /// Remove a session and both of its flags.
    pub fn destroy(&self, token: &str) -> bool {
        let removed = resilient_write(&self.sessions).remove(token);
        match removed {
            Some(record) => {
                let event = SessionEvent::Destroyed {
                    session_id: token.to_string(),
                    timestamp: Utc::now(),
                    session_duration_secs: record.created_at.elapsed().as_secs(),
                };
                tracing::info!("{}", event.to_audit_string());
                true
            }
            None => false,
        }
    }

    /// Remove expired sessions. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let removed = {
            let mut sessions = resilient_write(&self.sessions);
            let before = sessions.len();
            sessions.retain(|_, record| record.remaining(self.ttl).is_some());
            before - sessions.len()
        };

        if removed > 0 {
            let event = SessionEvent::Swept {
                removed,
                timestamp: Utc::now(),
            };
            tracing::info!("{}", event.to_audit_string());
        }
        removed
    }

    /// Number of sessions that have not expired yet.
    pub fn active_session_count(&self) -> usize {
        resilient_read(&self.sessions)
            .values()
            .filter(|record| record.remaining(self.ttl).is_some())
            .count()
    }
}
