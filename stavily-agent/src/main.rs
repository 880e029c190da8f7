//! Stavily Agent
//!
//! Polls an Orchestrator over HTTPS for instructions, installs plugins
//! from Git, executes them in a sandboxed subprocess, and reports
//! results back.
//!
//! Architecture:
//! - Configuration: load and validate the YAML config (`config.rs`)
//! - Client: typed HTTP calls to the Orchestrator (`stavily-client`)
//! - Store/Downloader/Executor: plugin lifecycle on disk
//! - Engine: heartbeat and poll loops coordinating the above

mod config;
mod downloader;
mod engine;
mod executor;
mod health;
mod keyed_lock;
mod store;

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use jsonwebtoken::Algorithm;
use stavily_client::{
    AuthProvider, OrchestratorClient, OrchestratorClientConfig, RetryPolicy, SelfSignedJwtProvider,
    StaticTokenProvider, TlsConfig,
};
use stavily_core::domain::instruction::InstructionType;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AuthMethod, Config};
use crate::downloader::PluginDownloader;
use crate::engine::EngineConfig;
use crate::executor::PluginExecutor;
use crate::executor::sandbox::SandboxLimits;
use crate::store::PluginStore;

/// Grace window between the root cancellation and abandoning in-flight
/// instruction tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "stavily-agent", version)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "/etc/stavily/agent.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent (default if no subcommand is given).
    Run,
    /// Load and validate the configuration, then exit.
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Validate => run_validate(&cli.config),
        Command::Run => {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("failed to start tokio runtime: {e}");
                    return ExitCode::from(1);
                }
            };
            runtime.block_on(run_agent(&cli.config))
        }
    }
}

fn run_validate(path: &std::path::Path) -> ExitCode {
    match Config::load(path) {
        Ok(_) => {
            println!("configuration is valid");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("configuration invalid: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run_agent(config_path: &std::path::Path) -> ExitCode {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::from(1);
        }
    };

    init_logging(&config);

    info!(agent_id = %config.agent.id, environment = ?config.agent.environment, "starting stavily-agent");

    match bootstrap_and_run(config).await {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "startup failed");
            ExitCode::from(1)
        }
    }
}

fn init_logging(config: &Config) {
    let filter = config
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "stavily_agent=info,stavily_client=info".to_string());

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
    );

    let audit_layer = (config.security.audit.enabled)
        .then(|| config.security.audit.path.as_ref())
        .flatten()
        .map(|path| {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(path);
            let file_appender = tracing_appender::rolling::daily(dir, "audit.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // Leaked deliberately, same rationale as the agent log guard below.
            std::mem::forget(guard);
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::filter::filter_fn(is_audit_event))
        });
    let registry = registry.with(audit_layer);

    // The human-readable agent log never duplicates audit events; those
    // are routed to `audit_layer` alone when it is present.
    let agent_filter = tracing_subscriber::filter::filter_fn(|m| !is_audit_event(m));

    if let Some(dir) = &config.logging.directory {
        let file_appender = tracing_appender::rolling::daily(dir, "stavily-agent.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leaked deliberately: the guard must outlive the process for the
        // background writer thread to flush, and main never returns early.
        std::mem::forget(guard);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_filter(agent_filter))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_filter(agent_filter)).init();
    }
}

fn is_audit_event(metadata: &tracing::Metadata<'_>) -> bool {
    metadata.target() == "audit"
}

fn build_auth_provider(config: &Config) -> anyhow::Result<Arc<dyn AuthProvider>> {
    let auth = &config.security.auth;
    match auth.method.unwrap_or(AuthMethod::ApiKey) {
        AuthMethod::ApiKey => {
            let key = auth
                .api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("security.auth.api_key is required for method api_key"))?;
            Ok(Arc::new(StaticTokenProvider::ApiKey(key)))
        }
        AuthMethod::Certificate => {
            let path = auth.token_file.clone().ok_or_else(|| {
                anyhow::anyhow!("security.auth.token_file is required for method certificate")
            })?;
            Ok(Arc::new(StaticTokenProvider::TokenFile(path)))
        }
        AuthMethod::Jwt => {
            let secret_path = auth.jwt_secret_path.clone().ok_or_else(|| {
                anyhow::anyhow!("security.auth.jwt_secret_path is required for method jwt")
            })?;
            let secret = std::fs::read(&secret_path)?;
            let algorithm = match auth.jwt_algorithm.as_deref().unwrap_or("HS256") {
                "HS256" => Algorithm::HS256,
                "HS384" => Algorithm::HS384,
                "HS512" => Algorithm::HS512,
                "RS256" => Algorithm::RS256,
                "RS384" => Algorithm::RS384,
                "RS512" => Algorithm::RS512,
                other => anyhow::bail!("unsupported jwt_algorithm: {other}"),
            };
            Ok(Arc::new(SelfSignedJwtProvider::new(
                config.agent.id.clone(),
                config.agent.tenant_id.clone(),
                config.api.base_url.clone(),
                algorithm,
                &secret,
                3600,
            )))
        }
    }
}

async fn bootstrap_and_run(config: Config) -> anyhow::Result<()> {
    let auth = build_auth_provider(&config)?;

    let tls = TlsConfig {
        min_version: match config.security.tls.min_version.as_deref() {
            Some("1.2") => stavily_client::tls::MinTlsVersion::Tls12,
            _ => stavily_client::tls::MinTlsVersion::Tls13,
        },
        ca_cert_path: config.security.tls.ca_cert_path.clone(),
        client_cert_path: config.security.tls.client_cert_path.clone(),
        client_key_path: config.security.tls.client_key_path.clone(),
        server_name_override: config.security.tls.server_name_override.clone(),
        insecure_skip_verify: config.security.tls.insecure_skip_verify,
    };

    let client = Arc::new(OrchestratorClient::new(OrchestratorClientConfig {
        base_url: config.api.base_url.clone(),
        agent_id: config.agent.id.clone(),
        environment: config.agent.environment,
        rate_limit_per_sec: config.api.rate_limit_rps,
        retry: RetryPolicy {
            max_attempts: config.api.retry_attempts,
            retry_delay: config.api.retry_delay,
        },
        tls,
        auth,
    })?);

    std::fs::create_dir_all(&config.plugins.base_folder)?;
    let store = PluginStore::new(config.plugins.base_folder.clone());
    let downloader = Arc::new(PluginDownloader::new(
        store.clone(),
        config.plugins.git_timeout,
        config.plugins.max_concurrent,
    ));
    let executor = Arc::new(PluginExecutor::new(SandboxLimits {
        max_memory_bytes: config.security.sandbox.max_memory_bytes,
        max_cpu_millis: config.security.sandbox.max_cpu_millis,
        wall_clock: Duration::from_secs(300),
        max_output_bytes: config.security.sandbox.max_output_bytes,
        disable_network: config.security.sandbox.disable_network,
    }));

    let supported_types: HashSet<InstructionType> = if config.agent.supported_instruction_types.is_empty() {
        HashSet::from([InstructionType::PluginInstall, InstructionType::PluginUpdate, InstructionType::Execute])
    } else {
        config
            .agent
            .supported_instruction_types
            .iter()
            .filter_map(|s| parse_instruction_type(s))
            .collect()
    };

    let cancel = CancellationToken::new();
    let (heartbeat_handle, poll_handle) = engine::spawn(
        client,
        store,
        downloader,
        executor,
        EngineConfig {
            heartbeat_period: config.agent.heartbeat,
            poll_interval: config.agent.poll_interval,
            max_concurrent_tasks: config.agent.max_concurrent_tasks,
            supported_types,
        },
        cancel.clone(),
    );

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, cancelling loops");
    cancel.cancel();

    if tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = heartbeat_handle.await;
        let _ = poll_handle.await;
    })
    .await
    .is_err()
    {
        warn!("shutdown grace period elapsed, abandoning in-flight instructions");
    }

    Ok(())
}

fn parse_instruction_type(raw: &str) -> Option<InstructionType> {
    match raw {
        "plugin_install" => Some(InstructionType::PluginInstall),
        "plugin_update" => Some(InstructionType::PluginUpdate),
        "execute" => Some(InstructionType::Execute),
        "manual" => Some(InstructionType::Manual),
        "workflow" => Some(InstructionType::Workflow),
        "scheduled" => Some(InstructionType::Scheduled),
        "api" => Some(InstructionType::Api),
        other => {
            warn!(value = other, "unrecognized entry in agent.supported_instruction_types, ignoring");
            None
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
