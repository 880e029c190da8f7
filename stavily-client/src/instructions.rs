//! Instruction lifecycle endpoints: poll, update, and submit final
//! results.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::OrchestratorClient;
use crate::error::Result;
use stavily_core::dto::instruction::{
    PollResponse, SubmitResultRequest, SubmitResultResponse, UpdateInstructionRequest,
    UpdateInstructionResponse,
};

impl OrchestratorClient {
    /// Polls for the next instruction assigned to this agent.
    ///
    /// The response's `next_poll_interval`, when present, overrides the
    /// engine's configured poll period for the following cycle.
    pub async fn poll_instructions(&self, cancel: &CancellationToken) -> Result<PollResponse> {
        let path = self.agent_path("/instructions");
        self.transport().get(&path, cancel).await
    }

    /// Reports an intermediate status transition (e.g. `Delivered` ->
    /// `Executing`) without submitting a final result.
    pub async fn update_instruction(
        &self,
        instruction_id: Uuid,
        req: UpdateInstructionRequest,
        cancel: &CancellationToken,
    ) -> Result<UpdateInstructionResponse> {
        let path = self.agent_path(&format!("/instructions/{instruction_id}"));
        self.transport().put(&path, &req, cancel).await
    }

    /// Submits the terminal result of an instruction. Callers are
    /// responsible for ensuring this is invoked at most once per
    /// instruction.
    pub async fn submit_instruction_result(
        &self,
        instruction_id: Uuid,
        req: SubmitResultRequest,
        cancel: &CancellationToken,
    ) -> Result<SubmitResultResponse> {
        let path = self.agent_path(&format!("/instructions/{instruction_id}/result"));
        self.transport().post(&path, &req, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrchestratorClient, RetryPolicy, StaticTokenProvider, Transport};
    use httpmock::MockServer;
    use std::sync::Arc;

    fn client_for(server: &MockServer) -> OrchestratorClient {
        let transport = Transport::new(
            reqwest::Client::new(),
            server.base_url(),
            Arc::new(crate::RateLimiter::new(1000.0)),
            Arc::new(StaticTokenProvider::ApiKey("test-token".to_string())),
            RetryPolicy {
                max_attempts: 3,
                retry_delay: std::time::Duration::from_millis(10),
            },
        );
        OrchestratorClient::with_transport(transport, "agent-001")
    }

    #[tokio::test]
    async fn no_pending_instructions_reports_next_poll_interval() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/agents/v1/agent-001/instructions");
            then.status(200).json_body(serde_json::json!({
                "instruction": null,
                "status": "no_pending_instructions",
                "next_poll_interval": 10,
            }));
        });

        let client = client_for(&server);
        let cancel = CancellationToken::new();
        let response = client.poll_instructions(&cancel).await.unwrap();

        mock.assert();
        assert!(response.instruction.is_none());
        assert_eq!(response.next_poll_interval, Some(10));
    }

    #[tokio::test]
    async fn update_instruction_retries_once_after_server_error() {
        let server = MockServer::start();
        let instruction_id = Uuid::new_v4();
        let path = format!("/agents/v1/agent-001/instructions/{instruction_id}");

        server.mock(|when, then| {
            when.method(httpmock::Method::PUT).path(path.clone());
            then.status(500);
        });
        let success = server.mock(|when, then| {
            when.method(httpmock::Method::PUT).path(path.clone());
            then.status(200).json_body(serde_json::json!({
                "success": true,
                "instruction_id": instruction_id,
                "updated_fields": ["status"],
            }));
        });

        let client = client_for(&server);
        let cancel = CancellationToken::new();
        let req = UpdateInstructionRequest {
            status: Some(stavily_core::domain::instruction::InstructionStatus::Executing),
            max_retries: None,
            execution_log: vec![],
        };
        let response = client.update_instruction(instruction_id, req, &cancel).await.unwrap();

        assert!(response.success);
        assert!(success.hits() >= 1);
    }
}
