//! Legacy "task" endpoints, kept for backward compatibility.
//! Semantically identical to the instruction endpoints, same lifecycle
//! and status vocabulary, under older route names and field names some
//! deployments still depend on.

use serde::{Deserialize, Serialize};

use crate::domain::instruction::{Instruction, InstructionStatus};
use crate::domain::log::LogEntry;
use crate::dto::heartbeat::HeartbeatStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct PollForTasksResponse {
    pub task: Option<Instruction>,
    pub status: String,
    #[serde(default)]
    pub next_poll_interval: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportTaskResultRequest {
    pub status: InstructionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub execution_log: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportAgentStatusRequest {
    pub status: HeartbeatStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
