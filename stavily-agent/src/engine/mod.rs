//! Instruction Engine: the top-level coordinator.
//!
//! Owns the heartbeat and poll loops and wires dispatched instruction
//! tasks to the Orchestrator Client, Plugin Store, Downloader, and
//! Executor.

pub mod dispatch;
pub mod heartbeat;
pub mod poll;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use stavily_client::OrchestratorClient;
use stavily_core::domain::instruction::InstructionType;
use tokio_util::sync::CancellationToken;

use crate::downloader::PluginDownloader;
use crate::executor::PluginExecutor;
use crate::health::HealthState;
use crate::store::PluginStore;

use self::dispatch::DispatchContext;

pub struct EngineConfig {
    pub heartbeat_period: Duration,
    pub poll_interval: Duration,
    pub max_concurrent_tasks: usize,
    pub supported_types: HashSet<InstructionType>,
}

/// Spawns the heartbeat and poll loops as independent tasks and returns
/// their join handles so `main` can await them under the shutdown
/// cancellation token.
pub fn spawn(
    client: Arc<OrchestratorClient>,
    store: PluginStore,
    downloader: Arc<PluginDownloader>,
    executor: Arc<PluginExecutor>,
    config: EngineConfig,
    cancel: CancellationToken,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let health = Arc::new(HealthState::new());

    let heartbeat_handle = tokio::spawn(heartbeat::run(
        Arc::clone(&client),
        health,
        config.heartbeat_period,
        cancel.clone(),
    ));

    let dispatch_ctx = Arc::new(DispatchContext {
        client,
        store,
        downloader,
        executor,
        supported_types: config.supported_types,
    });

    let poll_handle = tokio::spawn(poll::run(
        dispatch_ctx,
        config.poll_interval,
        config.max_concurrent_tasks,
        cancel,
    ));

    (heartbeat_handle, poll_handle)
}
