//! Activity Log - bounded, ordered event buffer for observability
//!
//! Newest-first, capped at 100 entries. All user-visible failures surface
//! through this stream; there is no blocking failure path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Maximum number of retained entries.
pub const LOG_CAPACITY: usize = 100;

/// Entry category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    /// Engine/system events
    Sys,
    /// Signal generation and admission decisions
    Sig,
    /// Contract purchases and settlements
    Trd,
    /// Vault allocations
    Vlt,
    /// Errors (transport, protocol, persistence)
    Err,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogKind::Sys => write!(f, "SYS"),
            LogKind::Sig => write!(f, "SIG"),
            LogKind::Trd => write!(f, "TRD"),
            LogKind::Vlt => write!(f, "VLT"),
            LogKind::Err => write!(f, "ERR"),
        }
    }
}

/// One activity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub kind: LogKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded newest-first buffer
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: VecDeque<ActivityLogEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(LOG_CAPACITY),
        }
    }

    /// Prepend an entry, evicting the oldest beyond capacity.
    pub fn append(&mut self, kind: LogKind, message: impl Into<String>) {
        self.entries.push_front(ActivityLogEntry {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        });
        self.entries.truncate(LOG_CAPACITY);
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &ActivityLogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot for callers, newest first.
    pub fn to_vec(&self) -> Vec<ActivityLogEntry> {
        self.entries.iter().cloned().collect()
    }
}
