//! Instruction domain types
//!
//! An instruction is a work item issued by the orchestrator, delivered via
//! poll, and owned exclusively by the dispatch task that accepted it until
//! it reaches a terminal status.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::log::LogEntry;

/// Kind of work an instruction represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionType {
    PluginInstall,
    PluginUpdate,
    Execute,
    Manual,
    Workflow,
    Scheduled,
    Api,
}

/// Lifecycle status of an instruction.
///
/// Transitions are monotonic: `Pending -> Delivered -> Executing ->
/// (Completed | Failed | Timeout | Cancelled)`. The last four are terminal
/// and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionStatus {
    Pending,
    Delivered,
    Executing,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl InstructionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InstructionStatus::Completed
                | InstructionStatus::Failed
                | InstructionStatus::Timeout
                | InstructionStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal forward transition per the
    /// lifecycle monotonicity invariant. Terminal statuses accept no
    /// further transition.
    pub fn can_transition_to(self, next: InstructionStatus) -> bool {
        use InstructionStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Delivered)
                | (Pending, Executing)
                | (Delivered, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Executing, Timeout)
                | (Executing, Cancelled)
        )
    }
}

/// A git reference used to materialize a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum PluginRef {
    Branch(String),
    Tag(String),
    CommitHash(String),
}

/// Plugin-specific configuration carried by an instruction: where to get
/// the plugin from, and how to run it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfiguration {
    #[serde(default)]
    pub plugin_url: Option<String>,
    #[serde(default)]
    pub plugin_ref: Option<PluginRef>,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// A unit of work delivered by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub id: Uuid,
    pub plugin_id: String,
    pub instruction_type: InstructionType,
    pub status: InstructionStatus,
    pub priority: i32,
    #[serde(default)]
    pub plugin_configuration: PluginConfiguration,
    #[serde(default)]
    pub input_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    #[serde(default)]
    pub retry_count: u32,
    pub correlation_id: Uuid,
}

/// Reason an instruction was refused or short-circuited before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    AgentBusy,
    UnsupportedType,
    PluginNotInstalled,
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::AgentBusy => write!(f, "agent_busy"),
            CancellationReason::UnsupportedType => write!(f, "unsupported_type"),
            CancellationReason::PluginNotInstalled => write!(f, "plugin_not_installed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

/// Structured log lines accumulated while processing an instruction,
/// shipped to the orchestrator as `execution_log`.
pub type ExecutionLog = Vec<LogEntry>;
