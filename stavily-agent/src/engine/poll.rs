//! Poll loop: fetches instructions and admits them for dispatch (spec
//! §4.6).

use std::sync::Arc;
use std::time::Duration;

use stavily_core::domain::instruction::{CancellationReason, InstructionStatus};
use stavily_core::domain::log::{LogEntry, LogLevel};
use stavily_core::dto::instruction::UpdateInstructionRequest;
use tokio::sync::Semaphore;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatch::{DispatchContext, dispatch};

/// Lower bound the server's `next_poll_interval` override is allowed to
/// apply: if present and >= 1s it overrides the next tick.
const MIN_OVERRIDE_SECS: u64 = 1;

/// Runs the poll loop until `cancel` fires, dispatching admitted
/// instructions on their own tasks bounded by `max_concurrent_tasks`.
pub async fn run(
    ctx: Arc<DispatchContext>,
    initial_period: Duration,
    max_concurrent_tasks: usize,
    cancel: CancellationToken,
) {
    let admission = Arc::new(Semaphore::new(max_concurrent_tasks));
    let mut period = initial_period;

    loop {
        tokio::select! {
            _ = time::sleep(period) => {}
            _ = cancel.cancelled() => {
                debug!("poll loop stopping on cancellation");
                return;
            }
        }

        let response = match ctx.client.poll_instructions(&cancel).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "poll failed");
                continue;
            }
        };

        if let Some(seconds) = response.next_poll_interval {
            if seconds >= MIN_OVERRIDE_SECS {
                period = Duration::from_secs(seconds);
            }
        } else {
            period = initial_period;
        }

        let Some(instruction) = response.instruction else {
            debug!("no pending instructions");
            continue;
        };

        let permit = match Arc::clone(&admission).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                info!(instruction_id = %instruction.id, "rejecting instruction: agent busy");
                reject_busy(&ctx, &instruction.id, &cancel).await;
                continue;
            }
        };

        let ctx = Arc::clone(&ctx);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            dispatch(ctx, instruction, cancel).await;
            drop(permit);
        });
    }
}

/// Reports admission failure directly as a `cancelled` update: this case
/// never enters `executing`, so it bypasses the usual
/// update-then-submit-result pair and is reported in one PUT.
async fn reject_busy(ctx: &DispatchContext, instruction_id: &uuid::Uuid, cancel: &CancellationToken) {
    let reason = CancellationReason::AgentBusy;
    let req = UpdateInstructionRequest {
        status: Some(InstructionStatus::Cancelled),
        max_retries: None,
        execution_log: vec![LogEntry {
            timestamp: chrono::Utc::now(),
            level: LogLevel::Warning,
            message: format!("rejected: {reason}"),
        }],
    };

    if let Err(e) = ctx.client.update_instruction(*instruction_id, req, cancel).await {
        error!(instruction_id = %instruction_id, error = %e, "failed to report agent_busy rejection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::PluginDownloader;
    use crate::executor::PluginExecutor;
    use crate::executor::sandbox::SandboxLimits;
    use crate::store::PluginStore;
    use httpmock::MockServer;
    use stavily_client::{OrchestratorClient, RetryPolicy, StaticTokenProvider, Transport};
    use std::collections::HashSet;

    fn ctx_for(server: &MockServer) -> DispatchContext {
        let transport = Transport::new(
            reqwest::Client::new(),
            server.base_url(),
            Arc::new(stavily_client::RateLimiter::new(1000.0)),
            Arc::new(StaticTokenProvider::ApiKey("test-token".to_string())),
            RetryPolicy {
                max_attempts: 1,
                retry_delay: Duration::from_millis(10),
            },
        );
        let client = Arc::new(OrchestratorClient::with_transport(transport, "agent-001"));
        let dir = tempfile::tempdir().unwrap();
        let store = PluginStore::new(dir.path());
        DispatchContext {
            client,
            store: store.clone(),
            downloader: Arc::new(PluginDownloader::new(store, Duration::from_secs(5), 4)),
            executor: Arc::new(PluginExecutor::new(SandboxLimits::default())),
            supported_types: HashSet::new(),
        }
    }

    /// S6: a second instruction arriving while the single admission slot
    /// is held is reported as a `cancelled`/`agent_busy` update, not a
    /// terminal result submission.
    #[tokio::test]
    async fn busy_rejection_reports_cancelled_update_only() {
        let server = MockServer::start();
        let instruction_id = uuid::Uuid::new_v4();
        let path = format!("/agents/v1/agent-001/instructions/{instruction_id}");
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::PUT).path(path.clone());
            then.status(200).json_body(serde_json::json!({
                "success": true,
                "instruction_id": instruction_id,
                "updated_fields": ["status"],
            }));
        });

        let ctx = ctx_for(&server);
        let cancel = CancellationToken::new();

        let semaphore = Arc::new(Semaphore::new(1));
        let _held = Arc::clone(&semaphore).try_acquire_owned().unwrap();
        assert!(Arc::clone(&semaphore).try_acquire_owned().is_err());

        reject_busy(&ctx, &instruction_id, &cancel).await;
        mock.assert();
    }
}
