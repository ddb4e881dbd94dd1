use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::probe::Prober;
use crate::report::{AggregateReport, ProbeResult};
use crate::status::HealthStatus;
use crate::target::ProbeTarget;

/// Runs the configured probes concurrently and folds them into one report.
///
/// Owns no state beyond the target list; every [`HealthAggregator::run`]
/// call is an independent, atomic run.
pub struct HealthAggregator {
    prober: Arc<dyn Prober>,
    targets: Vec<ProbeTarget>,
}

impl HealthAggregator {
    pub fn new(prober: Arc<dyn Prober>, targets: Vec<ProbeTarget>) -> Self {
        Self { prober, targets }
    }

    pub fn targets(&self) -> &[ProbeTarget] {
        &self.targets
    }

    /// Probe every target concurrently and wait for all of them.
    ///
    /// Results keep configuration order, the overall status is the worst of
    /// all checks, and the total response time is the wall-clock span of the
    /// run. An empty target list yields the sentinel report.
    pub async fn run(&self) -> AggregateReport {
        if self.targets.is_empty() {
            debug!("no probe targets configured; reporting unknown");
            return AggregateReport::unknown();
        }

        let started = Instant::now();
        let handles: Vec<_> = self
            .targets
            .iter()
            .map(|target| {
                let prober = Arc::clone(&self.prober);
                let target = target.clone();
                tokio::spawn(async move { prober.probe(&target).await })
            })
            .collect();

        let mut checks = Vec::with_capacity(handles.len());
        for (handle, target) in handles.into_iter().zip(&self.targets) {
            match handle.await {
                Ok(result) => checks.push(result),
                Err(e) => {
                    warn!(target = %target.name, error = %e, "probe task aborted");
                    checks.push(
                        ProbeResult::new(target.name.as_str(), HealthStatus::Unhealthy, 0)
                            .with_description("probe task aborted"),
                    );
                }
            }
        }

        let elapsed = started.elapsed();
        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            checks = checks.len(),
            "aggregation run finished"
        );
        AggregateReport::from_checks(checks, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{MockProbe, MockProber};
    use std::time::Duration;

    fn targets(names: &[&str]) -> Vec<ProbeTarget> {
        names
            .iter()
            .map(|name| {
                ProbeTarget::new(*name, format!("http://{name}.local/healthz"), Duration::from_millis(100))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_reports_every_target_in_config_order() {
        let prober = MockProber::new();
        let aggregator = HealthAggregator::new(Arc::new(prober), targets(&["c", "a", "b"]));

        let report = aggregator.run().await;

        let names: Vec<_> = report.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
        assert_eq!(report.total_status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_empty_target_list_reports_unknown() {
        let aggregator = HealthAggregator::new(Arc::new(MockProber::new()), Vec::new());

        let report = aggregator.run().await;

        assert_eq!(report, AggregateReport::unknown());
        assert_eq!(report.total_response_time_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_run_concurrently_not_serially() {
        let prober = MockProber::new()
            .with_probe("a", MockProbe::new(HealthStatus::Healthy, Duration::from_millis(40)))
            .with_probe("b", MockProbe::new(HealthStatus::Healthy, Duration::from_millis(100)))
            .with_probe("c", MockProbe::new(HealthStatus::Healthy, Duration::from_millis(40)));
        let aggregator = HealthAggregator::new(Arc::new(prober), targets(&["a", "b", "c"]));

        let report = aggregator.run().await;

        // Bounded by the slowest probe, not the sum of all three.
        assert!(report.total_response_time_ms >= 100);
        assert!(report.total_response_time_ms < 180);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_timed_out_probe_degrades_only_itself() {
        let prober = MockProber::new()
            .with_probe("a", MockProbe::new(HealthStatus::Healthy, Duration::from_millis(10)))
            .with_probe(
                "b",
                MockProbe::new(HealthStatus::Unhealthy, Duration::from_millis(100))
                    .with_description("probe timed out after 100ms"),
            )
            .with_probe("c", MockProbe::new(HealthStatus::Healthy, Duration::from_millis(10)));
        let aggregator = HealthAggregator::new(Arc::new(prober), targets(&["a", "b", "c"]));

        let report = aggregator.run().await;

        assert_eq!(report.checks[0].status, HealthStatus::Healthy);
        assert_eq!(report.checks[1].status, HealthStatus::Unhealthy);
        assert!(report.checks[1]
            .description
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert_eq!(report.checks[2].status, HealthStatus::Healthy);
        assert_eq!(report.total_status, HealthStatus::Unhealthy);
        assert!(report.total_response_time_ms >= 100);
        assert!(report.total_response_time_ms < 120);
    }

    #[tokio::test]
    async fn test_degraded_check_degrades_overall_status() {
        let prober = MockProber::new()
            .with_probe("b", MockProbe::new(HealthStatus::Degraded, Duration::ZERO));
        let aggregator = HealthAggregator::new(Arc::new(prober), targets(&["a", "b"]));

        let report = aggregator.run().await;

        assert_eq!(report.total_status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_run_probes_each_target_once() {
        let prober = Arc::new(MockProber::new());
        let aggregator = HealthAggregator::new(prober.clone(), targets(&["a", "b", "c"]));

        aggregator.run().await;

        assert_eq!(prober.calls(), 3);
    }
}
