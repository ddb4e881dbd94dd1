use serde::{Deserialize, Serialize};

/// Event name for server-initiated update signals.
pub const UPDATE_EVENT: &str = "Update";
/// Event name for client-initiated update signals.
pub const CLIENT_UPDATE_EVENT: &str = "ClientUpdate";

/// One hub message, in either direction.
///
/// Carries only the event name and a human-readable reason; the report
/// itself is never pushed, receivers re-fetch it over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubFrame {
    pub event: String,
    pub reason: String,
}

impl HubFrame {
    pub fn update(reason: impl Into<String>) -> Self {
        Self {
            event: UPDATE_EVENT.to_string(),
            reason: reason.into(),
        }
    }

    pub fn client_update(reason: impl Into<String>) -> Self {
        Self {
            event: CLIENT_UPDATE_EVENT.to_string(),
            reason: reason.into(),
        }
    }
}
