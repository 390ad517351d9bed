//! Contact correlation model

use serde::{Deserialize, Serialize};

use super::{SyncDirection, SyncOrigin};

/// Durable link between one contact on each platform for a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCorrelation {
    pub tenant_id: String,
    /// Contact id on the source platform
    pub source_contact_id: Option<String>,
    /// Contact id on the target platform
    pub target_contact_id: Option<String>,
    /// Last known email, used for fallback lookups
    pub email: Option<String>,
    /// Last sync timestamp (Unix ms)
    pub last_synced_at: i64,
    pub last_sync_direction: SyncDirection,
    pub last_sync_origin: SyncOrigin,
}

impl ContactCorrelation {
    /// Contact id on the side a change notification for `direction` comes from
    pub fn origin_contact_id(&self, direction: SyncDirection) -> Option<&str> {
        match direction {
            SyncDirection::SourceToTarget => self.source_contact_id.as_deref(),
            SyncDirection::TargetToSource => self.target_contact_id.as_deref(),
        }
    }

    /// Contact id on the side that receives the write for `direction`
    pub fn destination_contact_id(&self, direction: SyncDirection) -> Option<&str> {
        self.origin_contact_id(direction.opposite())
    }

    /// Whether the last write went the other way less than `window_ms` ago
    pub const fn is_recent_reverse(
        &self,
        direction: SyncDirection,
        now: i64,
        window_ms: i64,
    ) -> bool {
        matches!(
            (self.last_sync_direction, direction),
            (SyncDirection::SourceToTarget, SyncDirection::TargetToSource)
                | (SyncDirection::TargetToSource, SyncDirection::SourceToTarget)
        ) && now.saturating_sub(self.last_synced_at) < window_ms
    }
}
