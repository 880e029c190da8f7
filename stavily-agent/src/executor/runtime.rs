//! Runtime detection and per-variant process launch.
//!
//! Extending to a new runtime means adding a variant to
//! `stavily_core::domain::plugin::RuntimeKind` and a matching arm here.

use std::collections::HashMap;
use std::path::Path;

use stavily_core::domain::execution::FailureCode;
use stavily_core::domain::plugin::RuntimeKind;
use tokio::process::Command;

/// Detects the runtime for `entrypoint`, honoring an explicit manifest
/// override first, then falling back to suffix sniffing, then the
/// executable bit.
pub fn detect_runtime(
    manifest_runtime: Option<RuntimeKind>,
    entrypoint: &str,
    entrypoint_path: &Path,
) -> Result<RuntimeKind, FailureCode> {
    if let Some(kind) = manifest_runtime {
        return Ok(kind);
    }

    if entrypoint.ends_with(".py") {
        return Ok(RuntimeKind::Python);
    }
    if entrypoint.ends_with(".js") || entrypoint.ends_with(".mjs") {
        return Ok(RuntimeKind::Node);
    }
    if entrypoint.ends_with(".sh") {
        return Ok(RuntimeKind::Bash);
    }
    if entrypoint == "Dockerfile" || entrypoint.ends_with("/Dockerfile") {
        return Ok(RuntimeKind::Docker);
    }

    if is_executable(entrypoint_path) {
        return Ok(RuntimeKind::Native);
    }

    Err(FailureCode::UnsupportedRuntime)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Builds the child process command for every runtime except `Docker`,
/// which is handled by [`crate::executor::docker`] instead.
///
/// python/node get `--input input.json`; bash/native get the same data
/// via `PLUGIN_INPUT_PATH` plus the `input_env` vars (`PLUGIN_INPUT_DATA`,
/// `PLUGIN_INPUT_CONTEXT`, `PLUGIN_INPUT_VARIABLES`). Configured
/// environment is merged last and wins on conflict; configured arguments
/// are appended after the entrypoint.
pub fn build_command(
    kind: RuntimeKind,
    root: &Path,
    entrypoint: &str,
    input_json_path: &Path,
    input_env: &[(String, String)],
    env: &HashMap<String, String>,
    args: &[String],
) -> Option<Command> {
    let mut cmd = match kind {
        RuntimeKind::Python => {
            let mut c = Command::new("python3");
            c.arg(entrypoint).arg("--input").arg(input_json_path);
            c
        }
        RuntimeKind::Node => {
            let mut c = Command::new("node");
            c.arg(entrypoint).arg("--input").arg(input_json_path);
            c
        }
        RuntimeKind::Bash => {
            let mut c = Command::new("bash");
            c.arg(entrypoint);
            c
        }
        RuntimeKind::Native => Command::new(root.join(entrypoint)),
        RuntimeKind::Docker => return None,
    };

    cmd.current_dir(root);
    if matches!(kind, RuntimeKind::Bash | RuntimeKind::Native) {
        cmd.env("PLUGIN_INPUT_PATH", input_json_path);
        for (key, value) in input_env {
            cmd.env(key, value);
        }
    }
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.args(args);
    Some(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_python_by_suffix() {
        let kind = detect_runtime(None, "main.py", Path::new("/tmp/nonexistent")).unwrap();
        assert_eq!(kind, RuntimeKind::Python);
    }

    #[test]
    fn manifest_override_wins() {
        let kind = detect_runtime(Some(RuntimeKind::Docker), "main.py", Path::new("/tmp/x")).unwrap();
        assert_eq!(kind, RuntimeKind::Docker);
    }

    #[test]
    fn unrecognized_non_executable_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"x").unwrap();
        let err = detect_runtime(None, "data.bin", &path).unwrap_err();
        assert_eq!(err, FailureCode::UnsupportedRuntime);
    }
}
