//! Remote sync lifecycle for optimistically applied entities

use serde::{Deserialize, Serialize};

/// Where an optimistically applied change stands with the backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncState {
    /// Applied locally, remote call not yet resolved
    #[default]
    Pending,
    /// Accepted by the backend
    Committed,
    /// Rejected or unreachable; the local value is kept (or rolled back by the owner)
    Failed { reason: String },
}

impl SyncState {
    pub fn commit(&mut self) {
        *self = SyncState::Committed;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        *self = SyncState::Failed {
            reason: reason.into(),
        };
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SyncState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SyncState::Failed { .. })
    }
}
