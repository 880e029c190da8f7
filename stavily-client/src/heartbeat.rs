//! Heartbeat endpoint

use tokio_util::sync::CancellationToken;

use crate::OrchestratorClient;
use crate::error::Result;
use stavily_core::dto::heartbeat::{HeartbeatRequest, HeartbeatStatus};

impl OrchestratorClient {
    /// Sends a heartbeat reporting the agent's current health status.
    ///
    /// # Arguments
    /// * `status` - `Online` or `Degraded`, per the engine's
    ///   consecutive-failure tracking.
    pub async fn send_heartbeat(
        &self,
        status: HeartbeatStatus,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let req = HeartbeatRequest {
            timestamp: chrono::Utc::now(),
            status,
        };
        let path = self.agent_path("/heartbeat");
        let _: serde_json::Value = self.transport().post(&path, &req, cancel).await?;
        Ok(())
    }
}
