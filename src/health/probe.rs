//! Periodic per-backend health probing, driven by a `tokio::time::interval`
//! loop per backend, feeding probe outcomes into `BackendHealth` and
//! `CircuitBreaker`.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tracing::{debug, warn};

use crate::mcp_client::McpBackendClient;

use super::{BackendHealth, CircuitBreaker, HealthStatus};

/// One probe cycle: calls `list_tools` as a cheap liveness check and
/// records the outcome into both the health tracker and the circuit
/// breaker, which react to the same signal independently.
pub async fn probe_once(client: &dyn McpBackendClient, health: &BackendHealth, breaker: &CircuitBreaker) -> HealthStatus {
    match client.list_tools().await {
        Ok(_) => {
            health.record_probe(true);
            breaker.record_success();
            HealthStatus::Healthy
        }
        Err(e) => {
            warn!(backend = client.backend_id(), error = %e, "health probe failed");
            breaker.record_failure();
            health.record_probe(false)
        }
    }
}

/// Drives `probe_once` on a fixed interval until `shutdown` resolves.
/// Intended to be spawned as its own task per backend; the interval itself
/// is `FailureHandlingConfig::health_check_interval`, with
/// `health_check_timeout` (if set) bounding each individual probe call.
pub async fn run_probe_loop(
    client: Arc<dyn McpBackendClient>,
    health: Arc<BackendHealth>,
    breaker: Arc<CircuitBreaker>,
    interval: StdDuration,
    probe_timeout: Option<StdDuration>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = match probe_timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, probe_once(client.as_ref(), &health, &breaker)).await {
                        Ok(status) => status,
                        Err(_) => {
                            warn!(backend = client.backend_id(), "health probe timed out");
                            breaker.record_failure();
                            health.record_probe(false)
                        }
                    },
                    None => probe_once(client.as_ref(), &health, &breaker).await,
                };
                debug!(backend = client.backend_id(), status = ?outcome, "health probe completed");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::CircuitBreakerConfig;
    use crate::duration::Duration;
    use crate::error::BackendError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyClient {
        fail: AtomicBool,
    }

    #[async_trait]
    impl McpBackendClient for FlakyClient {
        fn backend_id(&self) -> &str {
            "flaky"
        }
        async fn list_tools(&self) -> Result<Vec<rmcp::model::Tool>, BackendError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(BackendError::Transport { backend: "flaky".into(), message: "down".into() })
            } else {
                Ok(vec![])
            }
        }
        async fn list_prompts(&self) -> Result<Vec<rmcp::model::Prompt>, BackendError> {
            Ok(vec![])
        }
        async fn list_resources(&self) -> Result<Vec<rmcp::model::Resource>, BackendError> {
            Ok(vec![])
        }
        async fn call_tool(&self, _name: &str, _args: Value) -> Result<rmcp::model::CallToolResult, BackendError> {
            unimplemented!()
        }
        async fn get_prompt(&self, _name: &str, _args: Value) -> Result<rmcp::model::GetPromptResult, BackendError> {
            unimplemented!()
        }
        async fn read_resource(&self, _uri: &str) -> Result<rmcp::model::ReadResourceResult, BackendError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn successful_probe_keeps_backend_healthy_and_circuit_closed() {
        let client = FlakyClient { fail: AtomicBool::new(false) };
        let health = BackendHealth::new(3);
        let breaker = CircuitBreaker::new("flaky", CircuitBreakerConfig { enabled: true, failure_threshold: 2, timeout: Duration::from_secs(30) });
        let status = probe_once(&client, &health, &breaker).await;
        assert_eq!(status, HealthStatus::Healthy);
        assert_eq!(breaker.state(), super::super::CircuitState::Closed);
    }

    #[tokio::test]
    async fn failing_probes_mark_unhealthy_and_open_circuit() {
        let client = FlakyClient { fail: AtomicBool::new(true) };
        let health = BackendHealth::new(2);
        let breaker = CircuitBreaker::new("flaky", CircuitBreakerConfig { enabled: true, failure_threshold: 2, timeout: Duration::from_secs(30) });
        probe_once(&client, &health, &breaker).await;
        let status = probe_once(&client, &health, &breaker).await;
        assert_eq!(status, HealthStatus::Unhealthy);
        assert_eq!(breaker.state(), super::super::CircuitState::Open);
    }
}
