use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::status::HealthStatus;

/// Outcome of one probe execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub name: String,
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProbeResult {
    pub fn new(name: impl Into<String>, status: HealthStatus, response_time_ms: u64) -> Self {
        Self {
            name: name.into(),
            response_time_ms,
            status,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Combined result of one aggregation run.
///
/// `checks` keeps configuration order. The wire shape matches the
/// `/api/health` contract: `checks`, `totalStatus`, `totalResponseTime`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub checks: Vec<ProbeResult>,
    #[serde(rename = "totalStatus")]
    pub total_status: HealthStatus,
    #[serde(rename = "totalResponseTime")]
    pub total_response_time_ms: u64,
}

impl AggregateReport {
    /// The sentinel report: no checks, `unknown` status, zero elapsed.
    pub fn unknown() -> Self {
        Self {
            checks: Vec::new(),
            total_status: HealthStatus::Unknown,
            total_response_time_ms: 0,
        }
    }

    pub fn from_checks(checks: Vec<ProbeResult>, elapsed: Duration) -> Self {
        let total_status = HealthStatus::worst(checks.iter().map(|check| check.status));
        Self {
            checks,
            total_status,
            total_response_time_ms: elapsed.as_millis() as u64,
        }
    }
}
