use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single probe or of a whole report.
///
/// `Unknown` is the sentinel: it never comes out of a real probe, only out of
/// an empty target set or a failed fetch on the client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    fn severity(self) -> u8 {
        match self {
            HealthStatus::Unknown => 0,
            HealthStatus::Healthy => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Unhealthy => 3,
        }
    }

    /// Worst status across `statuses`; `Unknown` for an empty iterator.
    pub fn worst<I>(statuses: I) -> HealthStatus
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses
            .into_iter()
            .fold(HealthStatus::Unknown, |acc, status| {
                if status.severity() > acc.severity() {
                    status
                } else {
                    acc
                }
            })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_of_empty_is_unknown() {
        assert_eq!(HealthStatus::worst([]), HealthStatus::Unknown);
    }

    #[test]
    fn test_worst_prefers_unhealthy() {
        let statuses = [
            HealthStatus::Healthy,
            HealthStatus::Unhealthy,
            HealthStatus::Degraded,
        ];
        assert_eq!(HealthStatus::worst(statuses), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_worst_degraded_beats_healthy() {
        let statuses = [HealthStatus::Healthy, HealthStatus::Degraded];
        assert_eq!(HealthStatus::worst(statuses), HealthStatus::Degraded);
    }

    #[test]
    fn test_all_healthy_is_healthy() {
        let statuses = [HealthStatus::Healthy, HealthStatus::Healthy];
        assert_eq!(HealthStatus::worst(statuses), HealthStatus::Healthy);
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unknown).unwrap(),
            "\"unknown\""
        );
    }
}
