use std::time::Duration;

/// Reconnect delay policy: `first × factor^attempt`, clamped to `max`.
///
/// The delay is derived purely from the attempt number, so a long outage
/// cannot feed back into later calculations.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectBackoff {
    pub first: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl ReconnectBackoff {
    /// Delay before retry number `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped_secs)
        }
    }
}
