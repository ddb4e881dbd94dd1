pub mod aggregator;
pub mod probe;
pub mod proto;
pub mod report;
pub mod status;
pub mod target;

pub use aggregator::HealthAggregator;
pub use probe::{HttpProber, MockProbe, MockProber, ProbeError, Prober};
pub use proto::{HubFrame, CLIENT_UPDATE_EVENT, UPDATE_EVENT};
pub use report::{AggregateReport, ProbeResult};
pub use status::HealthStatus;
pub use target::ProbeTarget;
