use std::time::Duration;

/// One configured probe target. Immutable after configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Unique name, used as the check name in reports.
    pub name: String,
    /// HTTP endpoint to probe.
    pub url: String,
    /// Hard deadline for the probe; exceeding it is an unhealthy result.
    pub timeout: Duration,
    /// Soft latency threshold; a response slower than this (but within the
    /// timeout) is reported as degraded.
    pub degraded_after: Option<Duration>,
}

impl ProbeTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout,
            degraded_after: None,
        }
    }

    pub fn with_degraded_after(mut self, threshold: Duration) -> Self {
        self.degraded_after = Some(threshold);
        self
    }
}
