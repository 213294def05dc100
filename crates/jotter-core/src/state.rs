//! Sync state shared by the coordinator and front ends.

use std::fmt;

/// Coarse mirroring state shown next to the note list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// No remote store configured
    #[default]
    Offline,
    /// Mirror operations are in flight
    Syncing,
    /// Every queued mirror operation has been applied remotely
    Synced,
    /// The most recent mirror operation failed
    Error,
}

impl SyncState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
