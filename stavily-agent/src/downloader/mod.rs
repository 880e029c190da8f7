//! Plugin Downloader: materializes a plugin from Git into the Plugin
//! Store idempotently.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use stavily_core::domain::execution::InstallationResult;
use stavily_core::domain::instruction::PluginRef;
use stavily_core::domain::log::{LogEntry, LogLevel};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::keyed_lock::KeyedLock;
use crate::store::{PluginStore, validate_layout};

/// Default ceiling on the `git clone`/`checkout` subprocess.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub struct PluginDownloader {
    store: PluginStore,
    locks: KeyedLock,
    git_timeout: Duration,
    concurrency: Arc<Semaphore>,
}

impl PluginDownloader {
    /// `max_concurrent` bounds installs across distinct plugin ids; the
    /// per-id `KeyedLock` still serializes installs of the same id.
    pub fn new(store: PluginStore, git_timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            store,
            locks: KeyedLock::new(),
            git_timeout,
            concurrency: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn store(&self) -> &PluginStore {
        &self.store
    }

    /// Installs `plugin_id` from `repo_url` at `plugin_ref`, or confirms
    /// an already-valid installation. Serialized per plugin id, bounded
    /// overall by `max_concurrent`.
    pub async fn install(
        &self,
        plugin_id: &str,
        repo_url: &str,
        plugin_ref: &PluginRef,
        entrypoint: Option<&str>,
    ) -> InstallationResult {
        let Ok(_permit) = self.concurrency.acquire().await else {
            return failed(plugin_id, Instant::now(), Vec::new(), "downloader shutting down".to_string());
        };
        let store = &self.store;
        self.locks
            .with_lock(plugin_id, || {
                install_locked(store, plugin_id, repo_url, plugin_ref, entrypoint, self.git_timeout)
            })
            .await
    }
}

async fn install_locked(
    store: &PluginStore,
    plugin_id: &str,
    repo_url: &str,
    plugin_ref: &PluginRef,
    entrypoint: Option<&str>,
    git_timeout: Duration,
) -> InstallationResult {
    let started = Instant::now();
    let mut logs = Vec::new();
    let target = store.path(plugin_id);

    if validate_layout(&target, entrypoint) {
        log(&mut logs, LogLevel::Info, format!("plugin {plugin_id} already installed"));
        return InstallationResult {
            plugin_id: plugin_id.to_string(),
            success: true,
            path: Some(target),
            resolved_version: resolved_version(plugin_ref),
            already_installed: true,
            logs,
            duration: started.elapsed(),
            error_message: None,
        };
    }

    let nonce = Uuid::new_v4();
    let tmp_dir = sibling_tmp_path(&target, nonce);

    let clone_result = clone_into(&tmp_dir, repo_url, plugin_ref, git_timeout, &mut logs).await;
    if let Err(e) = clone_result {
        cleanup_tmp(&tmp_dir).await;
        return failed(plugin_id, started, logs, format!("git clone failed: {e}"));
    }

    if !validate_layout(&tmp_dir, entrypoint) {
        cleanup_tmp(&tmp_dir).await;
        return failed(
            plugin_id,
            started,
            logs,
            "installed layout missing plugin.yaml or entrypoint".to_string(),
        );
    }

    if let Some(parent) = target.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            cleanup_tmp(&tmp_dir).await;
            return failed(plugin_id, started, logs, format!("failed to create plugins base: {e}"));
        }
    }

    if let Err(e) = tokio::fs::rename(&tmp_dir, &target).await {
        cleanup_tmp(&tmp_dir).await;
        return failed(plugin_id, started, logs, format!("atomic rename failed: {e}"));
    }

    log(&mut logs, LogLevel::Info, format!("installed plugin {plugin_id} at {}", target.display()));
    InstallationResult {
        plugin_id: plugin_id.to_string(),
        success: true,
        path: Some(target),
        resolved_version: resolved_version(plugin_ref),
        already_installed: false,
        logs,
        duration: started.elapsed(),
        error_message: None,
    }
}

fn sibling_tmp_path(target: &Path, nonce: Uuid) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{file_name}.tmp-{nonce}"))
}

async fn clone_into(
    tmp_dir: &Path,
    repo_url: &str,
    plugin_ref: &PluginRef,
    timeout: Duration,
    logs: &mut Vec<LogEntry>,
) -> anyhow::Result<()> {
    if let Some(parent) = tmp_dir.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let clone_fut = match plugin_ref {
        PluginRef::Branch(name) | PluginRef::Tag(name) => {
            log(logs, LogLevel::Info, format!("cloning {repo_url} at {name} (depth=1)"));
            run_git(&[
                "clone",
                "--depth",
                "1",
                "--branch",
                name,
                repo_url,
                &tmp_dir.to_string_lossy(),
            ])
        }
        PluginRef::CommitHash(hash) => {
            log(logs, LogLevel::Info, format!("cloning {repo_url} (full) then checking out {hash}"));
            run_git(&["clone", repo_url, &tmp_dir.to_string_lossy()])
        }
    };

    tokio::time::timeout(timeout, clone_fut)
        .await
        .map_err(|_| anyhow::anyhow!("git clone timed out after {:?}", timeout))??;

    if let PluginRef::CommitHash(hash) = plugin_ref {
        let checkout = run_git_in(tmp_dir, &["checkout", hash]);
        tokio::time::timeout(timeout, checkout)
            .await
            .map_err(|_| anyhow::anyhow!("git checkout timed out after {:?}", timeout))??;
    }

    Ok(())
}

async fn run_git(args: &[&str]) -> anyhow::Result<()> {
    run_git_command(Command::new("git").args(args)).await
}

async fn run_git_in(dir: &Path, args: &[&str]) -> anyhow::Result<()> {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir).args(args);
    run_git_command(&mut cmd).await
}

async fn run_git_command(cmd: &mut Command) -> anyhow::Result<()> {
    let output = cmd.output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git exited with {}: {}", output.status, stderr.trim());
    }
    Ok(())
}

async fn cleanup_tmp(tmp_dir: &Path) {
    if tmp_dir.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(tmp_dir).await {
            warn!("failed to remove temp install dir {}: {e}", tmp_dir.display());
        }
    }
}

fn failed(
    plugin_id: &str,
    started: Instant,
    mut logs: Vec<LogEntry>,
    message: String,
) -> InstallationResult {
    log(&mut logs, LogLevel::Error, message.clone());
    InstallationResult {
        plugin_id: plugin_id.to_string(),
        success: false,
        path: None,
        resolved_version: None,
        already_installed: false,
        logs,
        duration: started.elapsed(),
        error_message: Some(message),
    }
}

fn resolved_version(plugin_ref: &PluginRef) -> Option<String> {
    match plugin_ref {
        PluginRef::Branch(b) => Some(b.clone()),
        PluginRef::Tag(t) => Some(t.clone()),
        PluginRef::CommitHash(h) => Some(h.clone()),
    }
}

fn log(logs: &mut Vec<LogEntry>, level: LogLevel, message: String) {
    debug!("{message}");
    logs.push(LogEntry {
        timestamp: chrono::Utc::now(),
        level,
        message,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn already_installed_short_circuits() {
        let dir = tempdir().unwrap();
        let store = PluginStore::new(dir.path());
        let plugin_dir = store.path("demo");
        tokio::fs::create_dir_all(&plugin_dir).await.unwrap();
        tokio::fs::write(plugin_dir.join("plugin.yaml"), "entrypoint: main.py")
            .await
            .unwrap();

        let downloader = PluginDownloader::new(store, DEFAULT_GIT_TIMEOUT, 4);
        let result = downloader
            .install("demo", "https://example.test/demo", &PluginRef::Branch("main".to_string()), None)
            .await;

        assert!(result.success);
        assert!(result.already_installed);
    }

    #[tokio::test]
    async fn failed_clone_leaves_no_temp_dir() {
        let dir = tempdir().unwrap();
        let store = PluginStore::new(dir.path());
        let downloader = PluginDownloader::new(store, Duration::from_millis(200), 4);

        let result = downloader
            .install(
                "nope",
                "https://nonexistent.invalid/repo.git",
                &PluginRef::Branch("main".to_string()),
                None,
            )
            .await;

        assert!(!result.success);
        let mut entries = std::fs::read_dir(dir.path()).unwrap();
        assert!(entries.next().is_none());
    }

    /// `max_concurrent` bounds installs across distinct plugin ids, not
    /// just same-id serialization from the keyed lock.
    #[tokio::test]
    async fn max_concurrent_bounds_available_permits() {
        let dir = tempdir().unwrap();
        let store = PluginStore::new(dir.path());
        let downloader = PluginDownloader::new(store, DEFAULT_GIT_TIMEOUT, 2);

        assert_eq!(downloader.concurrency.available_permits(), 2);
        let permit = downloader.concurrency.clone().acquire_owned().await.unwrap();
        assert_eq!(downloader.concurrency.available_permits(), 1);
        drop(permit);
        assert_eq!(downloader.concurrency.available_permits(), 2);
    }
}
