//! Instruction lifecycle DTOs for the three non-heartbeat endpoints:
//! poll, update, and submit-result.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::{ExecutionResult, InstallationResult};
use crate::domain::instruction::{ErrorDetails, Instruction, InstructionStatus};
use crate::domain::log::LogEntry;

/// `GET /agents/v1/{agent_id}/instructions`
#[derive(Debug, Clone, Deserialize)]
pub struct PollResponse {
    pub instruction: Option<Instruction>,
    pub status: String,
    #[serde(default)]
    pub next_poll_interval: Option<u64>,
}

/// `PUT /agents/v1/{agent_id}/instructions/{id}` request body.
///
/// Only the first transition to `executing` is permitted to change
/// `status`; subsequent calls for the same instruction must pass `None`
/// and append log lines only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateInstructionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InstructionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub execution_log: Vec<LogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateInstructionResponse {
    pub success: bool,
    pub instruction_id: Uuid,
    #[serde(default)]
    pub updated_fields: Vec<String>,
}

/// `POST /agents/v1/{agent_id}/instructions/{id}/result` request body.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResultRequest {
    pub status: InstructionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SubmittedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub execution_log: Vec<LogEntry>,
}

/// Either half of the terminal outcome, whichever the instruction type
/// produced.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SubmittedResult {
    Install(InstallationResult),
    Execution(ExecutionResult),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResultResponse {
    pub acknowledged: bool,
    #[serde(default)]
    pub next_instruction: Option<Instruction>,
}
