use anyhow::Result;
use health_sync::{HttpReportFetcher, SyncClient, SyncClientOptions, WsConnector};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

struct WatcherConfig {
    hub_url: Url,
    status_url: Url,
    refresh_interval: Option<Duration>,
}

impl WatcherConfig {
    fn from_env() -> Result<Self> {
        let hub_url = Url::parse(
            &std::env::var("HUB_URL")
                .unwrap_or_else(|_| "ws://localhost:3000/api/health-hub".to_string()),
        )?;
        let status_url = Url::parse(
            &std::env::var("STATUS_URL")
                .unwrap_or_else(|_| "http://localhost:3000/api/health".to_string()),
        )?;
        let refresh_interval = match std::env::var("REFRESH_INTERVAL_SECS") {
            Ok(value) => Some(Duration::from_secs(value.parse::<u64>()?)),
            Err(_) => None,
        };
        Ok(Self {
            hub_url,
            status_url,
            refresh_interval,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WatcherConfig::from_env()?;
    info!(hub = %config.hub_url, status = %config.status_url, "starting health watcher");

    let connector = Arc::new(WsConnector::new(config.hub_url.as_str()));
    let fetcher = Arc::new(HttpReportFetcher::new(config.status_url.as_str())?);
    let client = SyncClient::new(
        connector,
        fetcher,
        SyncClientOptions {
            refresh_interval: config.refresh_interval,
            ..Default::default()
        },
    );
    client.start();

    let mut reports = client.reports();
    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                info!(
                    status = %report.total_status,
                    checks = report.checks.len(),
                    elapsed_ms = report.total_response_time_ms,
                    "report updated"
                );
                for check in &report.checks {
                    info!(
                        check = %check.name,
                        status = %check.status,
                        response_ms = check.response_time_ms,
                        description = check.description.as_deref().unwrap_or(""),
                        "check"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down watcher");
                client.shutdown();
                break;
            }
        }
    }

    Ok(())
}
