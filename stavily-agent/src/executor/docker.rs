//! Docker runtime: runs a plugin whose entrypoint is a `Dockerfile` by
//! building and running the image as a one-shot container.
//!
//! Adapted from the agent's own container lifecycle management: build
//! once, mount the plugin root read-only plus a scratch input file, run
//! to completion, always clean up.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Builds the plugin's `Dockerfile` into a one-shot image tag.
pub async fn build_image(root: &Path, plugin_id: &str) -> anyhow::Result<String> {
    let tag = format!("stavily-plugin-{plugin_id}-{}", Uuid::new_v4());
    info!("building docker image {tag} from {}", root.display());

    let output = Command::new("docker")
        .arg("build")
        .arg("-t")
        .arg(&tag)
        .arg(root)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("docker build failed: {}", stderr.trim());
    }

    Ok(tag)
}

/// Runs `image_tag` as a detached, network-optional container mounting
/// `root` at `/workspace`, returning stdout/stderr/exit code once it
/// finishes or `None` if it is still running after `wall_clock`.
pub async fn run_container(
    image_tag: &str,
    root: &Path,
    env: &[(String, String)],
    disable_network: bool,
    wall_clock: Duration,
) -> anyhow::Result<(String, String, i32, bool)> {
    let container_name = format!("stavily-run-{}", Uuid::new_v4());

    let mut cmd = Command::new("docker");
    cmd.arg("run")
        .arg("--name")
        .arg(&container_name)
        .arg("-v")
        .arg(format!("{}:/workspace:ro", root.display()))
        .arg("-w")
        .arg("/workspace");

    if disable_network {
        cmd.arg("--network").arg("none");
    }
    for (key, value) in env {
        cmd.arg("-e").arg(format!("{key}={value}"));
    }
    cmd.arg(image_tag);

    let child = cmd.output();
    let timed_out = match tokio::time::timeout(wall_clock, child).await {
        Ok(result) => {
            let output = result?;
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let exit_code = output.status.code().unwrap_or(1);
            cleanup(&container_name).await;
            return Ok((stdout, stderr, exit_code, false));
        }
        Err(_) => true,
    };

    if timed_out {
        warn!("container {container_name} exceeded wall clock, killing");
        let _ = Command::new("docker").arg("kill").arg(&container_name).output().await;
        cleanup(&container_name).await;
    }

    Ok((String::new(), String::new(), 1, true))
}

async fn cleanup(container_name: &str) {
    let output = Command::new("docker")
        .arg("rm")
        .arg("-f")
        .arg(container_name)
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => debug!("container {container_name} removed"),
        Ok(out) => warn!(
            "failed to remove container {container_name}: {}",
            String::from_utf8_lossy(&out.stderr)
        ),
        Err(e) => warn!("failed to remove container {container_name}: {e}"),
    }
}
