//! Plugin Executor: runs an installed plugin as a child process and
//! collects its structured result.

pub mod docker;
pub mod output;
pub mod runtime;
pub mod sandbox;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::Value;
use stavily_core::domain::execution::{ExecutionResult, FailureCode};
use stavily_core::domain::instruction::PluginConfiguration;
use stavily_core::domain::log::{LogEntry, LogLevel};
use stavily_core::domain::plugin::{InstalledPlugin, RuntimeKind};
use tracing::{error, info};

use self::output::{parse_output_data, stderr_to_logs, truncate_output};
use self::sandbox::{SandboxLimits, WaitOutcome, apply_resource_limits, wait_with_timeout};

pub struct PluginExecutor {
    default_limits: SandboxLimits,
}

impl PluginExecutor {
    pub fn new(default_limits: SandboxLimits) -> Self {
        Self { default_limits }
    }

    /// Runs `plugin` with the given instruction-scoped input, honoring
    /// `timeout_seconds` as a ceiling on `default_limits.wall_clock`.
    pub async fn execute(
        &self,
        plugin: &InstalledPlugin,
        configuration: &PluginConfiguration,
        input_data: &HashMap<String, Value>,
        context: &HashMap<String, Value>,
        variables: &HashMap<String, Value>,
        timeout_seconds: u64,
    ) -> Result<ExecutionResult, FailureCode> {
        let started = Instant::now();
        let mut limits = self.default_limits.clone();
        limits.wall_clock = limits.wall_clock.min(Duration::from_secs(timeout_seconds));

        let input_path = write_input_file(plugin, input_data, context, variables)
            .await
            .map_err(|_| FailureCode::ExecutionFailed)?;
        let input_env = plugin_input_env_vars(input_data, context, variables);

        let (stdout, stderr, exit_code, timed_out) = match plugin.runtime {
            RuntimeKind::Docker => {
                let image = docker::build_image(&plugin.root, &plugin.plugin_id)
                    .await
                    .map_err(|_| FailureCode::ExecutionFailed)?;
                let mut env: Vec<(String, String)> = configuration.environment.clone().into_iter().collect();
                env.extend(input_env);
                docker::run_container(&image, &plugin.root, &env, limits.disable_network, limits.wall_clock)
                    .await
                    .map_err(|_| FailureCode::ExecutionFailed)?
            }
            kind => {
                let mut cmd = runtime::build_command(
                    kind,
                    &plugin.root,
                    &plugin.entrypoint,
                    &input_path,
                    &input_env,
                    &configuration.environment,
                    &configuration.arguments,
                )
                .ok_or(FailureCode::UnsupportedRuntime)?;

                cmd.stdout(std::process::Stdio::piped());
                cmd.stderr(std::process::Stdio::piped());

                let mut child = cmd.spawn().map_err(|_| FailureCode::ExecutionFailed)?;
                apply_resource_limits(&limits, child.id());

                // Pipes must be drained concurrently with the wait: a
                // plugin writing more than the OS pipe buffer would
                // otherwise block on write and never exit.
                let stdout_task = tokio::spawn(read_all(child.stdout.take()));
                let stderr_task = tokio::spawn(read_all(child.stderr.take()));

                let outcome = wait_with_timeout(&mut child, &limits)
                    .await
                    .map_err(|_| FailureCode::ExecutionFailed)?;

                let stdout_bytes = stdout_task.await.unwrap_or_default();
                let stderr_bytes = stderr_task.await.unwrap_or_default();

                match outcome {
                    WaitOutcome::Exited(status) => (
                        stdout_bytes,
                        stderr_bytes,
                        status.code().unwrap_or(1),
                        false,
                    ),
                    WaitOutcome::TimedOut => (stdout_bytes, stderr_bytes, 1, true),
                }
            }
        };

        let (stdout_text, stdout_truncated) = truncate_output(stdout.as_bytes(), limits.max_output_bytes);
        let mut logs = stderr_to_logs(&stderr);
        if stdout_truncated {
            logs.push(LogEntry {
                timestamp: chrono::Utc::now(),
                level: LogLevel::Warning,
                message: "stdout truncated at max_output_bytes".to_string(),
            });
        }

        if timed_out {
            return Err(FailureCode::Timeout);
        }

        let output_data = if exit_code == 0 {
            Some(parse_output_data(&stdout_text))
        } else {
            None
        };

        info!(
            plugin_id = %plugin.plugin_id,
            exit_code,
            "plugin execution finished"
        );

        Ok(ExecutionResult {
            plugin_id: plugin.plugin_id.clone(),
            success: exit_code == 0,
            exit_code,
            output_data,
            logs,
            duration: started.elapsed(),
            timestamp: chrono::Utc::now(),
        })
    }
}

async fn write_input_file(
    plugin: &InstalledPlugin,
    input_data: &HashMap<String, Value>,
    context: &HashMap<String, Value>,
    variables: &HashMap<String, Value>,
) -> std::io::Result<PathBuf> {
    let path = plugin.root.join("input.json");
    let payload = serde_json::json!({
        "input_data": input_data,
        "context": context,
        "variables": variables,
    });
    tokio::fs::write(&path, serde_json::to_vec(&payload).unwrap_or_default()).await?;
    Ok(path)
}

/// The same `input_data`/`context`/`variables` fields written to
/// `input.json`, JSON-encoded per field so bash/Docker runtimes that
/// never read the file can still see them as `PLUGIN_INPUT_*` env vars.
fn plugin_input_env_vars(
    input_data: &HashMap<String, Value>,
    context: &HashMap<String, Value>,
    variables: &HashMap<String, Value>,
) -> Vec<(String, String)> {
    vec![
        ("PLUGIN_INPUT_DATA".to_string(), serde_json::to_string(input_data).unwrap_or_default()),
        ("PLUGIN_INPUT_CONTEXT".to_string(), serde_json::to_string(context).unwrap_or_default()),
        ("PLUGIN_INPUT_VARIABLES".to_string(), serde_json::to_string(variables).unwrap_or_default()),
    ]
}

async fn read_all(handle: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    use tokio::io::AsyncReadExt;
    let Some(mut handle) = handle else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = handle.read_to_end(&mut buf).await {
        error!("failed to read child output: {e}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}
