pub mod backoff;
pub mod client;
pub mod supervisor;
pub mod transport;

pub use backoff::ReconnectBackoff;
pub use client::{
    FetchError, HttpReportFetcher, MockReportFetcher, ReportFetcher, SyncClient,
    SyncClientOptions,
};
pub use supervisor::{ConnectionState, ConnectionSupervisor, SupervisorOptions, SyncSignal};
pub use transport::{
    mock_channel, ChannelError, HubChannel, HubConnector, MockChannel, MockChannelHandle,
    MockConnector, WsChannel, WsConnector,
};
