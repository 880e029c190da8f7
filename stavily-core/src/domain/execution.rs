//! Execution result domain types produced by the Plugin Downloader and
//! Plugin Executor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::log::LogEntry;

/// Outcome of running a plugin's entrypoint once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plugin_id: String,
    pub success: bool,
    pub exit_code: i32,
    pub output_data: Option<serde_json::Value>,
    pub logs: Vec<LogEntry>,
    #[serde(with = "duration_seconds")]
    pub duration: Duration,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Outcome of materializing a plugin from its Git repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationResult {
    pub plugin_id: String,
    pub success: bool,
    pub path: Option<std::path::PathBuf>,
    pub resolved_version: Option<String>,
    pub already_installed: bool,
    pub logs: Vec<LogEntry>,
    #[serde(with = "duration_seconds")]
    pub duration: Duration,
    pub error_message: Option<String>,
}

/// The handful of ways install or execution failed, recorded so a
/// terminal `InstructionResult` can carry a stable `error_details.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    UnsupportedRuntime,
    PluginNotInstalled,
    InstallFailed,
    ExecutionFailed,
    ResourceExceeded,
    Timeout,
    TransportError,
    DecodeError,
}

/// Request/response bodies serialize durations as non-negative
/// fractional seconds.
mod duration_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_result_round_trips_duration() {
        let result = ExecutionResult {
            plugin_id: "demo".to_string(),
            success: true,
            exit_code: 0,
            output_data: Some(serde_json::json!({"doubled": 6})),
            logs: vec![],
            duration: Duration::from_millis(1500),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.duration.as_millis(), 1500);
    }
}
