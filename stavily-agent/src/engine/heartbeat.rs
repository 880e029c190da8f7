//! Heartbeat loop: independent ticker reporting local health.

use std::sync::Arc;
use std::time::Duration;

use stavily_client::OrchestratorClient;
use stavily_core::dto::heartbeat::HeartbeatStatus;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::health::HealthState;

/// Runs the heartbeat loop until `cancel` fires. Failures are logged and
/// counted; they never stop the loop.
pub async fn run(
    client: Arc<OrchestratorClient>,
    health: Arc<HealthState>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                debug!("heartbeat loop stopping on cancellation");
                return;
            }
        }

        let status = if health.is_degraded() {
            HeartbeatStatus::Degraded
        } else {
            HeartbeatStatus::Online
        };

        match client.send_heartbeat(status, &cancel).await {
            Ok(()) => health.record_success(),
            Err(e) => {
                let degraded = health.record_failure();
                warn!(error = %e, degraded, "heartbeat failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_status_is_reported_after_failures() {
        let health = HealthState::new();
        for _ in 0..3 {
            health.record_failure();
        }
        assert!(health.is_degraded());
    }
}
