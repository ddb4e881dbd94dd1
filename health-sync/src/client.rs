use async_trait::async_trait;
use health_checks::{AggregateReport, CLIENT_UPDATE_EVENT};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::supervisor::{ConnectionSupervisor, SupervisorOptions, SyncSignal};
use crate::transport::HubConnector;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("invalid payload: {0}")]
    Decode(String),
}

/// Fetches the current report from the status endpoint.
#[async_trait]
pub trait ReportFetcher: Send + Sync {
    async fn fetch(&self) -> Result<AggregateReport, FetchError>;
}

pub struct HttpReportFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpReportFetcher {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReportFetcher for HttpReportFetcher {
    async fn fetch(&self) -> Result<AggregateReport, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        response
            .json::<AggregateReport>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

pub struct MockReportFetcher {
    responses: Mutex<VecDeque<Result<AggregateReport, FetchError>>>,
    default_report: AggregateReport,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockReportFetcher {
    pub fn new() -> Self {
        let default_report = AggregateReport::from_checks(
            vec![health_checks::ProbeResult::new(
                "mock",
                health_checks::HealthStatus::Healthy,
                1,
            )],
            Duration::from_millis(1),
        );
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_report,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue one scripted response; once drained, the default report is used.
    pub fn with_response(self, response: Result<AggregateReport, FetchError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn default_report(&self) -> AggregateReport {
        self.default_report.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockReportFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportFetcher for MockReportFetcher {
    async fn fetch(&self) -> Result<AggregateReport, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.responses.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None => Ok(self.default_report.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncClientOptions {
    /// Optional client-driven refresh period.
    pub refresh_interval: Option<Duration>,
    pub supervisor: SupervisorOptions,
}

#[derive(Default)]
struct FetchFlags {
    in_flight: bool,
    queued: bool,
}

struct SyncShared {
    fetcher: Arc<dyn ReportFetcher>,
    reports: watch::Sender<AggregateReport>,
    fetch_flags: Mutex<FetchFlags>,
    stopped: AtomicBool,
}

/// Consumes supervisor signals and republishes the latest report.
///
/// Every trigger — connect, hub event, local timer — funnels into one fetch
/// path that keeps at most one request in flight and at most one queued, so
/// a burst of N triggers costs two fetches, never N.
pub struct SyncClient {
    shared: Arc<SyncShared>,
    supervisor: ConnectionSupervisor,
    reports_rx: watch::Receiver<AggregateReport>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncClient {
    pub fn new(
        connector: Arc<dyn HubConnector>,
        fetcher: Arc<dyn ReportFetcher>,
        options: SyncClientOptions,
    ) -> Self {
        let (reports_tx, reports_rx) = watch::channel(AggregateReport::unknown());
        let shared = Arc::new(SyncShared {
            fetcher,
            reports: reports_tx,
            fetch_flags: Mutex::new(FetchFlags::default()),
            stopped: AtomicBool::new(false),
        });
        let (supervisor, mut signals) =
            ConnectionSupervisor::new(connector, options.supervisor);

        let mut tasks = Vec::new();
        {
            let shared = Arc::clone(&shared);
            tasks.push(tokio::spawn(async move {
                while let Some(signal) = signals.recv().await {
                    match signal {
                        SyncSignal::Connected => refresh(&shared, "channel connected"),
                        SyncSignal::HubEvent { event, reason } => {
                            debug!(%event, %reason, "update signal received");
                            refresh(&shared, &event);
                        }
                    }
                }
            }));
        }

        if let Some(period) = options.refresh_interval {
            let shared = Arc::clone(&shared);
            tasks.push(tokio::spawn(async move {
                let first_tick = tokio::time::Instant::now() + period;
                let mut ticker = tokio::time::interval_at(first_tick, period);
                loop {
                    ticker.tick().await;
                    refresh(&shared, "local timer");
                }
            }));
        }

        Self {
            shared,
            supervisor,
            reports_rx,
            tasks: Mutex::new(tasks),
        }
    }

    /// Start the hub connection; the first connect triggers the bootstrap
    /// fetch.
    pub fn start(&self) {
        self.supervisor.start();
    }

    /// Latest-value stream of reports, seeded with the unknown sentinel.
    pub fn reports(&self) -> watch::Receiver<AggregateReport> {
        self.reports_rx.clone()
    }

    pub fn latest(&self) -> AggregateReport {
        self.reports_rx.borrow().clone()
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Ask the hub to refresh every viewer, this client included.
    pub fn request_refresh(&self, reason: impl Into<String>) {
        self.supervisor.invoke(CLIENT_UPDATE_EVENT, reason);
    }

    /// Idempotent teardown: stops the timer, disables auto-reconnect, and
    /// discards any in-flight fetch result.
    pub fn shutdown(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.supervisor.stop();
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        debug!("sync client stopped");
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn refresh(shared: &Arc<SyncShared>, trigger: &str) {
    if shared.stopped.load(Ordering::SeqCst) {
        return;
    }

    {
        let mut flags = shared.fetch_flags.lock().unwrap();
        if flags.in_flight {
            flags.queued = true;
            debug!(trigger, "fetch already in flight; queued one re-fetch");
            return;
        }
        flags.in_flight = true;
    }

    debug!(trigger, "fetching current report");
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        loop {
            let outcome = shared.fetcher.fetch().await;

            if shared.stopped.load(Ordering::SeqCst) {
                let mut flags = shared.fetch_flags.lock().unwrap();
                flags.in_flight = false;
                flags.queued = false;
                debug!("discarding fetch result after teardown");
                return;
            }

            let report = match outcome {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "report fetch failed; publishing unknown");
                    AggregateReport::unknown()
                }
            };
            shared.reports.send_replace(report);

            let run_again = {
                let mut flags = shared.fetch_flags.lock().unwrap();
                if flags.queued {
                    flags.queued = false;
                    true
                } else {
                    flags.in_flight = false;
                    false
                }
            };
            if !run_again {
                return;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockConnector;
    use health_checks::{HealthStatus, HubFrame, UPDATE_EVENT};

    fn test_client(
        connector: Arc<MockConnector>,
        fetcher: Arc<MockReportFetcher>,
        options: SyncClientOptions,
    ) -> SyncClient {
        SyncClient::new(connector, fetcher, options)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_triggers_bootstrap_fetch() {
        let connector = Arc::new(MockConnector::new());
        let _handle = connector.push_accept();
        let fetcher = Arc::new(MockReportFetcher::new());
        let client = test_client(connector, fetcher.clone(), SyncClientOptions::default());

        let mut reports = client.reports();
        assert_eq!(client.latest(), AggregateReport::unknown());

        client.start();
        reports.changed().await.unwrap();

        assert_eq!(*reports.borrow_and_update(), fetcher.default_report());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_after_reconnect_triggers_exactly_one_fetch() {
        let connector = Arc::new(MockConnector::new());
        let first = connector.push_accept();
        let second = connector.push_accept();
        let fetcher = Arc::new(MockReportFetcher::new());
        let client = test_client(connector, fetcher.clone(), SyncClientOptions::default());

        client.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fetcher.calls(), 1);

        // Transport-level reconnect: bootstrap fetch runs again, listeners
        // are not duplicated.
        first.close();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(client.supervisor().listener_count(UPDATE_EVENT), 1);

        second.push_frame(HubFrame::update("post-reconnect"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_burst_causes_at_most_two_fetches() {
        let connector = Arc::new(MockConnector::new());
        let handle = connector.push_accept();
        let fetcher = Arc::new(MockReportFetcher::new().with_delay(Duration::from_millis(100)));
        let client = test_client(connector, fetcher.clone(), SyncClientOptions::default());

        client.start();
        // Let the bootstrap fetch get in flight.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetcher.calls(), 1);

        for n in 0..5 {
            handle.push_frame(HubFrame::update(format!("burst {n}")));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        // One in flight plus one queued re-fetch, never five.
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_publishes_sentinel_then_recovers() {
        let connector = Arc::new(MockConnector::new());
        let handle = connector.push_accept();
        let fetcher = Arc::new(
            MockReportFetcher::new()
                .with_response(Err(FetchError::Request("connection reset".to_string()))),
        );
        let client = test_client(connector, fetcher.clone(), SyncClientOptions::default());

        let mut reports = client.reports();
        client.start();

        reports.changed().await.unwrap();
        assert_eq!(*reports.borrow_and_update(), AggregateReport::unknown());

        handle.push_frame(HubFrame::update("retry"));
        reports.changed().await.unwrap();

        let report = reports.borrow_and_update().clone();
        assert_eq!(report, fetcher.default_report());
        assert_eq!(report.total_status, HealthStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_in_flight_fetch() {
        let connector = Arc::new(MockConnector::new());
        let _handle = connector.push_accept();
        let fetcher = Arc::new(MockReportFetcher::new().with_delay(Duration::from_millis(100)));
        let client = test_client(connector, fetcher.clone(), SyncClientOptions::default());

        let reports = client.reports();
        client.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetcher.calls(), 1);

        client.shutdown();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // The in-flight result arrived after teardown and was dropped.
        assert!(!reports.has_changed().unwrap());
        assert_eq!(client.latest(), AggregateReport::unknown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent() {
        let connector = Arc::new(MockConnector::new());
        let _handle = connector.push_accept();
        let fetcher = Arc::new(MockReportFetcher::new());
        let client = test_client(connector, fetcher, SyncClientOptions::default());

        client.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        client.shutdown();
        client.shutdown();
        client.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_timer_drives_periodic_fetches() {
        let connector = Arc::new(MockConnector::new());
        let _handle = connector.push_accept();
        let fetcher = Arc::new(MockReportFetcher::new());
        let options = SyncClientOptions {
            refresh_interval: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let client = test_client(connector, fetcher.clone(), options);

        client.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetcher.calls(), 1);

        tokio::time::sleep(Duration::from_secs(130)).await;

        // Bootstrap plus two timer ticks.
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_refresh_invokes_client_update() {
        let connector = Arc::new(MockConnector::new());
        let handle = connector.push_accept();
        let fetcher = Arc::new(MockReportFetcher::new());
        let client = test_client(connector, fetcher, SyncClientOptions::default());

        client.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        client.request_refresh("dashboard button");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            handle.drain_sent(),
            vec![HubFrame::client_update("dashboard button")]
        );
    }
}
