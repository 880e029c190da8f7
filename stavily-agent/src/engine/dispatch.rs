//! Per-instruction state machine and dispatch rules.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use stavily_client::OrchestratorClient;
use stavily_core::domain::execution::FailureCode;
use stavily_core::domain::instruction::{
    CancellationReason, ErrorDetails, Instruction, InstructionStatus, InstructionType, PluginRef,
};
use stavily_core::domain::log::{LogEntry, LogLevel};
use stavily_core::domain::plugin::InstalledPlugin;
use stavily_core::dto::instruction::{SubmitResultRequest, SubmittedResult, UpdateInstructionRequest};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::downloader::PluginDownloader;
use crate::executor::PluginExecutor;
use crate::executor::runtime::detect_runtime;
use crate::store::PluginStore;

/// Everything a dispatched instruction task needs. Deliberately excludes
/// a handle back to the engine, avoiding a cyclic reference.
pub struct DispatchContext {
    pub client: Arc<OrchestratorClient>,
    pub store: PluginStore,
    pub downloader: Arc<PluginDownloader>,
    pub executor: Arc<PluginExecutor>,
    pub supported_types: HashSet<InstructionType>,
}

/// Runs one instruction through its full lifecycle: report `executing`,
/// dispatch by type, report the terminal outcome.
pub async fn dispatch(ctx: Arc<DispatchContext>, instruction: Instruction, cancel: CancellationToken) {
    let started_at = Utc::now();
    let mut log = vec![entry(LogLevel::Info, "instruction accepted")];

    if !ctx.supported_types.contains(&instruction.instruction_type) {
        submit_cancelled(&ctx, &instruction, CancellationReason::UnsupportedType, log, &cancel).await;
        return;
    }

    if let Err(e) = ctx
        .client
        .update_instruction(
            instruction.id,
            UpdateInstructionRequest {
                status: Some(InstructionStatus::Executing),
                max_retries: None,
                execution_log: log.clone(),
            },
            &cancel,
        )
        .await
    {
        warn!(instruction_id = %instruction.id, error = %e, "failed to report executing transition");
    }

    let outcome = match instruction.instruction_type {
        InstructionType::PluginInstall | InstructionType::PluginUpdate => {
            install(&ctx, &instruction, &mut log, &cancel).await
        }
        InstructionType::Execute => execute(&ctx, &instruction, &mut log, &cancel).await,
        _ => {
            submit_cancelled(&ctx, &instruction, CancellationReason::UnsupportedType, log, &cancel).await;
            return;
        }
    };

    let ended_at = Utc::now();
    let (status, result, error_message, error_details) = outcome;
    info!(
        instruction_id = %instruction.id,
        duration_ms = (ended_at - started_at).num_milliseconds(),
        "instruction processing finished"
    );

    let req = SubmitResultRequest {
        status,
        result,
        error_message,
        error_details,
        execution_log: log,
    };

    submit_result(&ctx, instruction.id, req, &cancel).await;
}

type Outcome = (
    InstructionStatus,
    Option<SubmittedResult>,
    Option<String>,
    Option<ErrorDetails>,
);

async fn install(
    ctx: &DispatchContext,
    instruction: &Instruction,
    log: &mut Vec<LogEntry>,
    _cancel: &CancellationToken,
) -> Outcome {
    let Some(plugin_url) = instruction.plugin_configuration.plugin_url.clone() else {
        log.push(entry(LogLevel::Error, "plugin_install requires plugin_url"));
        return failure(InstructionStatus::Failed, FailureCode::InstallFailed, "missing plugin_url");
    };
    let plugin_ref = instruction
        .plugin_configuration
        .plugin_ref
        .clone()
        .unwrap_or(PluginRef::Branch("main".to_string()));
    let entrypoint = instruction.plugin_configuration.entrypoint.as_deref();

    let result = ctx
        .downloader
        .install(&instruction.plugin_id, &plugin_url, &plugin_ref, entrypoint)
        .await;

    log.extend(result.logs.clone());

    if result.success {
        (
            InstructionStatus::Completed,
            Some(SubmittedResult::Install(result)),
            None,
            None,
        )
    } else {
        let message = result.error_message.clone().unwrap_or_default();
        (
            InstructionStatus::Failed,
            Some(SubmittedResult::Install(result)),
            Some(message),
            Some(ErrorDetails {
                code: "install_failed".to_string(),
                context: Default::default(),
            }),
        )
    }
}

async fn execute(
    ctx: &DispatchContext,
    instruction: &Instruction,
    log: &mut Vec<LogEntry>,
    cancel: &CancellationToken,
) -> Outcome {
    let Some(entrypoint) = instruction.plugin_configuration.entrypoint.clone() else {
        log.push(entry(LogLevel::Error, "execute requires entrypoint"));
        return failure(InstructionStatus::Failed, FailureCode::ExecutionFailed, "missing entrypoint");
    };

    let already_installed = ctx.store.is_installed(&instruction.plugin_id, Some(&entrypoint));

    if !already_installed {
        match instruction.plugin_configuration.plugin_url.clone() {
            Some(plugin_url) => {
                let plugin_ref = instruction
                    .plugin_configuration
                    .plugin_ref
                    .clone()
                    .unwrap_or(PluginRef::Branch("main".to_string()));
                let install_result = ctx
                    .downloader
                    .install(&instruction.plugin_id, &plugin_url, &plugin_ref, Some(&entrypoint))
                    .await;
                log.extend(install_result.logs.clone());
                if !install_result.success {
                    let message = install_result.error_message.clone().unwrap_or_default();
                    return (
                        InstructionStatus::Failed,
                        Some(SubmittedResult::Install(install_result)),
                        Some(message),
                        Some(ErrorDetails {
                            code: "install_failed".to_string(),
                            context: Default::default(),
                        }),
                    );
                }
            }
            None => {
                log.push(entry(LogLevel::Error, "plugin not installed and no plugin_url to install from"));
                return failure(
                    InstructionStatus::Failed,
                    FailureCode::PluginNotInstalled,
                    "plugin not installed",
                );
            }
        }
    }

    let root = ctx.store.path(&instruction.plugin_id);
    let entrypoint_path = root.join(&entrypoint);
    let runtime = match detect_runtime(None, &entrypoint, &entrypoint_path) {
        Ok(kind) => kind,
        Err(code) => return failure(InstructionStatus::Failed, code, "unsupported runtime"),
    };

    let plugin = InstalledPlugin {
        plugin_id: instruction.plugin_id.clone(),
        root,
        entrypoint,
        runtime,
    };

    let result = ctx
        .executor
        .execute(
            &plugin,
            &instruction.plugin_configuration,
            &instruction.input_data,
            &instruction.context,
            &instruction.variables,
            instruction.timeout_seconds,
        )
        .await;

    let _ = cancel;
    match result {
        Ok(execution_result) => {
            log.extend(execution_result.logs.clone());
            if execution_result.success {
                (
                    InstructionStatus::Completed,
                    Some(SubmittedResult::Execution(execution_result)),
                    None,
                    None,
                )
            } else {
                (
                    InstructionStatus::Failed,
                    Some(SubmittedResult::Execution(execution_result)),
                    Some("plugin exited non-zero".to_string()),
                    Some(ErrorDetails {
                        code: "execution_failed".to_string(),
                        context: Default::default(),
                    }),
                )
            }
        }
        Err(FailureCode::Timeout) => {
            log.push(entry(LogLevel::Error, "execution exceeded timeout_seconds"));
            failure(InstructionStatus::Timeout, FailureCode::Timeout, "execution timed out")
        }
        Err(code) => {
            log.push(entry(LogLevel::Error, format!("execution failed: {code:?}")));
            failure(InstructionStatus::Failed, code, "execution failed")
        }
    }
}

fn failure(status: InstructionStatus, code: FailureCode, message: &str) -> Outcome {
    (
        status,
        None,
        Some(message.to_string()),
        Some(ErrorDetails {
            code: format!("{code:?}"),
            context: Default::default(),
        }),
    )
}

fn entry(level: LogLevel, message: impl Into<String>) -> LogEntry {
    LogEntry {
        timestamp: Utc::now(),
        level,
        message: message.into(),
    }
}

async fn submit_cancelled(
    ctx: &DispatchContext,
    instruction: &Instruction,
    reason: CancellationReason,
    mut log: Vec<LogEntry>,
    cancel: &CancellationToken,
) {
    log.push(entry(LogLevel::Warning, format!("cancelled: {reason}")));
    let req = SubmitResultRequest {
        status: InstructionStatus::Cancelled,
        result: None,
        error_message: Some(reason.to_string()),
        error_details: Some(ErrorDetails {
            code: reason.to_string(),
            context: Default::default(),
        }),
        execution_log: log,
    };
    submit_result(ctx, instruction.id, req, cancel).await;
}

/// Submits the terminal result with the transport's built-in retry. If
/// it is exhausted, the instruction id is logged for reconciliation and
/// never re-executed: the Orchestrator is authoritative and will
/// re-deliver if it never recorded the result.
async fn submit_result(
    ctx: &DispatchContext,
    instruction_id: uuid::Uuid,
    req: SubmitResultRequest,
    cancel: &CancellationToken,
) {
    let status = req.status;
    if let Err(e) = ctx.client.submit_instruction_result(instruction_id, req, cancel).await {
        error!(
            instruction_id = %instruction_id,
            error = %e,
            "failed to submit terminal result; logged for reconciliation, will not re-execute"
        );
    } else {
        info!(instruction_id = %instruction_id, "terminal result submitted");
    }
    info!(target: "audit", instruction_id = %instruction_id, status = ?status, "instruction result reported");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_reason_renders_snake_case() {
        assert_eq!(CancellationReason::UnsupportedType.to_string(), "unsupported_type");
    }
}
