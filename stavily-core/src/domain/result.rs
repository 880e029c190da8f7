//! Terminal instruction result, submitted at most once per instruction id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::execution::{ExecutionResult, InstallationResult};
use super::instruction::{ErrorDetails, InstructionStatus, InstructionType};
use super::log::LogEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionResult {
    pub instruction_id: Uuid,
    pub instruction_type: InstructionType,
    pub status: InstructionStatus,
    pub success: bool,
    #[serde(default)]
    pub install_result: Option<InstallationResult>,
    #[serde(default)]
    pub execution_result: Option<ExecutionResult>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_details: Option<ErrorDetails>,
    pub processing_log: Vec<LogEntry>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: chrono::DateTime<chrono::Utc>,
}

impl InstructionResult {
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}
