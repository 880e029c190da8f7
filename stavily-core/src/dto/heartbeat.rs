//! Heartbeat DTOs for `POST /agents/v1/{agent_id}/heartbeat`

use serde::{Deserialize, Serialize};

/// Local health, reported on every heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatStatus {
    Online,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatRequest {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: HeartbeatStatus,
}
