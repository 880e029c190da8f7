//! Legacy "task" API aliases, kept for older Orchestrator deployments.
//! Behaviorally identical to the instruction endpoints.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::OrchestratorClient;
use crate::error::Result;
use stavily_core::dto::legacy::{
    PollForTasksResponse, ReportAgentStatusRequest, ReportTaskResultRequest,
};

impl OrchestratorClient {
    pub async fn poll_for_tasks(&self, cancel: &CancellationToken) -> Result<PollForTasksResponse> {
        let path = self.agent_path("/tasks/poll");
        self.transport().get(&path, cancel).await
    }

    pub async fn report_task_result(
        &self,
        task_id: Uuid,
        req: ReportTaskResultRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = self.agent_path(&format!("/tasks/{task_id}/result"));
        let _: serde_json::Value = self.transport().post(&path, &req, cancel).await?;
        Ok(())
    }

    pub async fn report_agent_status(
        &self,
        req: ReportAgentStatusRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = self.agent_path("/status");
        let _: serde_json::Value = self.transport().post(&path, &req, cancel).await?;
        Ok(())
    }
}
