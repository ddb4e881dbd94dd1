use health_checks::ProbeTarget;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const DEFAULT_TARGETS: &str = "example=https://example.com,google=https://www.google.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: '{value}'")]
    InvalidVar { name: &'static str, value: String },
    #[error("invalid target entry '{entry}': {problem}")]
    InvalidTarget { entry: String, problem: String },
    #[error("duplicate target name '{0}'")]
    DuplicateTarget(String),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub targets: Vec<ProbeTarget>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_var("PORT", "3000")?;
        let timeout = Duration::from_millis(parse_var("PROBE_TIMEOUT_MS", "100")?);

        let degraded_after = match std::env::var("DEGRADED_AFTER_MS") {
            Ok(value) => {
                let ms = value.parse::<u64>().map_err(|_| ConfigError::InvalidVar {
                    name: "DEGRADED_AFTER_MS",
                    value,
                })?;
                Some(Duration::from_millis(ms))
            }
            Err(_) => None,
        };

        let raw_targets =
            std::env::var("HEALTH_TARGETS").unwrap_or_else(|_| DEFAULT_TARGETS.to_string());
        let targets = parse_targets(&raw_targets, timeout, degraded_after)?;

        let config = Self { port, targets };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.name.as_str()) {
                return Err(ConfigError::DuplicateTarget(target.name.clone()));
            }
        }
        Ok(())
    }

    pub fn log_configuration(&self) {
        info!(
            port = self.port,
            targets = self.targets.len(),
            "server configuration loaded"
        );
        for target in &self.targets {
            info!(
                target = %target.name,
                url = %target.url,
                timeout_ms = target.timeout.as_millis() as u64,
                "probe target"
            );
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = std::env::var(name).unwrap_or_else(|_| default.to_string());
    value.parse::<T>().map_err(|_| ConfigError::InvalidVar {
        name,
        value,
    })
}

/// Parses a comma-separated target list: `name=url` or `name=url@timeout_ms`.
fn parse_targets(
    raw: &str,
    default_timeout: Duration,
    degraded_after: Option<Duration>,
) -> Result<Vec<ProbeTarget>, ConfigError> {
    let mut targets = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, rest) = entry.split_once('=').ok_or_else(|| ConfigError::InvalidTarget {
            entry: entry.to_string(),
            problem: "expected name=url".to_string(),
        })?;

        // Only treat a trailing `@...` as a timeout when it is all digits;
        // URLs may legitimately contain `@`.
        let (url, timeout) = match rest.rsplit_once('@') {
            Some((url, ms)) if !ms.is_empty() && ms.chars().all(|c| c.is_ascii_digit()) => {
                let ms = ms.parse::<u64>().map_err(|_| ConfigError::InvalidTarget {
                    entry: entry.to_string(),
                    problem: "timeout out of range".to_string(),
                })?;
                (url, Duration::from_millis(ms))
            }
            _ => (rest, default_timeout),
        };

        if name.is_empty() || url.is_empty() {
            return Err(ConfigError::InvalidTarget {
                entry: entry.to_string(),
                problem: "name and url must be non-empty".to_string(),
            });
        }

        let mut target = ProbeTarget::new(name, url, timeout);
        if let Some(threshold) = degraded_after {
            target = target.with_degraded_after(threshold);
        }
        targets.push(target);
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets_basic() {
        let targets = parse_targets(
            "web=https://web.local/healthz,db=https://db.local/ping",
            Duration::from_millis(100),
            None,
        )
        .unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name, "web");
        assert_eq!(targets[0].url, "https://web.local/healthz");
        assert_eq!(targets[0].timeout, Duration::from_millis(100));
        assert_eq!(targets[1].name, "db");
    }

    #[test]
    fn test_parse_targets_per_target_timeout() {
        let targets = parse_targets(
            "slow=https://slow.local/@2500",
            Duration::from_millis(100),
            None,
        )
        .unwrap();

        assert_eq!(targets[0].timeout, Duration::from_millis(2500));
        assert_eq!(targets[0].url, "https://slow.local/");
    }

    #[test]
    fn test_parse_targets_url_with_at_sign_keeps_default_timeout() {
        let targets = parse_targets(
            "auth=https://user@auth.local/ping",
            Duration::from_millis(100),
            None,
        )
        .unwrap();

        assert_eq!(targets[0].url, "https://user@auth.local/ping");
        assert_eq!(targets[0].timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_parse_targets_applies_degraded_threshold() {
        let targets = parse_targets(
            "web=https://web.local/",
            Duration::from_millis(100),
            Some(Duration::from_millis(50)),
        )
        .unwrap();

        assert_eq!(targets[0].degraded_after, Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_parse_targets_rejects_entry_without_url() {
        let err = parse_targets("just-a-name", Duration::from_millis(100), None).unwrap_err();
        assert!(err.to_string().contains("expected name=url"));
    }

    #[test]
    fn test_parse_targets_empty_list_is_allowed() {
        let targets = parse_targets("", Duration::from_millis(100), None).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let config = ServerConfig {
            port: 3000,
            targets: parse_targets(
                "web=https://a.local/,web=https://b.local/",
                Duration::from_millis(100),
                None,
            )
            .unwrap(),
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTarget(name) if name == "web"));
    }
}
