//! The fixed event vocabulary published on the Event Bus (spec §6.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ConfigChanged { name: String },
    ConfigCommitted { names: Vec<String>, snapshot_id: String },
    ConfigReverted { names: Vec<String>, restored_snapshot_id: String },
    SnapshotCreated { snapshot_id: String },
    TransactionStarted { message: String },
    TransactionCompleted,
    TransactionFailed { detail: String },
    RollbackStarted { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl RouterEvent {
    pub fn now(kind: EventKind) -> Self {
        Self { timestamp: Utc::now(), kind }
    }
}
