use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::report::ProbeResult;
use crate::status::HealthStatus;
use crate::target::ProbeTarget;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0}ms")]
    Timeout(u64),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Executes one liveness check against one target.
///
/// A probe is a single attempt: no retries, and failures are encoded into
/// the returned [`ProbeResult`] rather than surfaced as errors.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &ProbeTarget) -> ProbeResult;
}

pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    async fn execute(&self, target: &ProbeTarget) -> Result<(), ProbeError> {
        let request = self.client.get(&target.url).timeout(target.timeout).send();
        match request.await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(ProbeError::Transport(format!(
                "unexpected status {}",
                response.status()
            ))),
            Err(e) if e.is_timeout() => {
                Err(ProbeError::Timeout(target.timeout.as_millis() as u64))
            }
            Err(e) => Err(ProbeError::Transport(e.to_string())),
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeResult {
        let started = Instant::now();
        let outcome = self.execute(target).await;
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        match outcome {
            Ok(()) => match target.degraded_after {
                Some(threshold) if elapsed > threshold => {
                    ProbeResult::new(target.name.as_str(), HealthStatus::Degraded, elapsed_ms)
                        .with_description(format!(
                            "round trip took {elapsed_ms}ms, over the {}ms degraded threshold",
                            threshold.as_millis()
                        ))
                }
                _ => ProbeResult::new(target.name.as_str(), HealthStatus::Healthy, elapsed_ms)
                    .with_description(format!("round trip took {elapsed_ms}ms")),
            },
            Err(e) => ProbeResult::new(target.name.as_str(), HealthStatus::Unhealthy, elapsed_ms)
                .with_description(e.to_string()),
        }
    }
}

/// Scripted probe behavior for one target name.
#[derive(Debug, Clone)]
pub struct MockProbe {
    pub status: HealthStatus,
    pub delay: Duration,
    pub description: Option<String>,
}

impl MockProbe {
    pub fn new(status: HealthStatus, delay: Duration) -> Self {
        Self {
            status,
            delay,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub struct MockProber {
    probes: HashMap<String, MockProbe>,
    default_probe: MockProbe,
    calls: AtomicUsize,
}

impl MockProber {
    pub fn new() -> Self {
        Self {
            probes: HashMap::new(),
            default_probe: MockProbe::new(HealthStatus::Healthy, Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_probe(mut self, name: &str, probe: MockProbe) -> Self {
        self.probes.insert(name.to_string(), probe);
        self
    }

    pub fn with_default_probe(mut self, probe: MockProbe) -> Self {
        self.default_probe = probe;
        self
    }

    /// Number of probe executions so far, across all targets.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let probe = self
            .probes
            .get(&target.name)
            .unwrap_or(&self.default_probe)
            .clone();

        if !probe.delay.is_zero() {
            tokio::time::sleep(probe.delay).await;
        }

        let mut result = ProbeResult::new(
            target.name.as_str(),
            probe.status,
            probe.delay.as_millis() as u64,
        );
        if let Some(description) = probe.description {
            result = result.with_description(description);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error_names_the_timeout() {
        let err = ProbeError::Timeout(100);
        assert_eq!(err.to_string(), "probe timed out after 100ms");
    }

    #[tokio::test]
    async fn test_mock_prober_returns_scripted_result() {
        let prober = MockProber::new().with_probe(
            "db",
            MockProbe::new(HealthStatus::Unhealthy, Duration::ZERO)
                .with_description("connection refused"),
        );

        let target = ProbeTarget::new("db", "http://db.local/healthz", Duration::from_millis(100));
        let result = prober.probe(&target).await;

        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.description.as_deref(), Some("connection refused"));
        assert_eq!(prober.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_prober_falls_back_to_default() {
        let prober = MockProber::new();
        let target = ProbeTarget::new("web", "http://web.local/", Duration::from_millis(100));

        let result = prober.probe(&target).await;

        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.name, "web");
    }
}
