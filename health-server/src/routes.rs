use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
};
use futures_util::{SinkExt, StreamExt};
use health_checks::{AggregateReport, HealthAggregator, HubFrame, CLIENT_UPDATE_EVENT};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::hub::BroadcastHub;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<HealthAggregator>,
    pub hub: Arc<BroadcastHub>,
}

/// `GET /api/health` — runs a fresh aggregation per request.
pub async fn get_health(State(state): State<AppState>) -> Json<AggregateReport> {
    Json(state.aggregator.run().await)
}

/// `HEAD /api/heartbeat` — liveness of the service itself.
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct BroadcastParams {
    reason: Option<String>,
}

/// `GET /api/broadcast/update` — operator-driven aggregate-and-notify.
pub async fn broadcast_update(
    State(state): State<AppState>,
    Query(params): Query<BroadcastParams>,
) -> String {
    let reason = params
        .reason
        .unwrap_or_else(|| "operator refresh".to_string());
    state.hub.server_update(&reason).await;
    "Update signal sent to all viewers.".to_string()
}

/// `GET /api/health-hub` — WebSocket upgrade into the broadcast hub.
pub async fn hub_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_viewer(socket, state))
}

async fn handle_viewer(socket: WebSocket, state: AppState) {
    let (viewer_id, mut outbound) = state.hub.register();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let payload = match serde_json::to_string(&frame) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(viewer = viewer_id, error = %e, "failed to encode hub frame");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_invocation(&state, viewer_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(viewer = viewer_id, error = %e, "viewer socket error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.unregister(viewer_id);
}

async fn handle_invocation(state: &AppState, viewer_id: u64, text: &str) {
    match serde_json::from_str::<HubFrame>(text) {
        Ok(frame) if frame.event == CLIENT_UPDATE_EVENT => {
            debug!(viewer = viewer_id, reason = %frame.reason, "client update invoked");
            state.hub.client_update(&frame.reason).await;
        }
        Ok(frame) => {
            warn!(viewer = viewer_id, event = %frame.event, "unsupported hub invocation");
        }
        Err(e) => {
            warn!(viewer = viewer_id, error = %e, "malformed hub frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use health_checks::{HealthStatus, MockProbe, MockProber, ProbeTarget, UPDATE_EVENT};
    use std::time::Duration;

    fn test_state(prober: MockProber, target_names: &[&str]) -> AppState {
        let targets = target_names
            .iter()
            .map(|name| {
                ProbeTarget::new(*name, format!("http://{name}.local/"), Duration::from_millis(100))
            })
            .collect();
        let aggregator = Arc::new(HealthAggregator::new(Arc::new(prober), targets));
        let hub = Arc::new(BroadcastHub::new(aggregator.clone()));
        AppState { aggregator, hub }
    }

    #[tokio::test]
    async fn test_get_health_reports_every_target() {
        let prober = MockProber::new()
            .with_probe("db", MockProbe::new(HealthStatus::Unhealthy, Duration::ZERO));
        let state = test_state(prober, &["web", "db"]);

        let Json(report) = get_health(State(state)).await;

        assert_eq!(report.checks.len(), 2);
        assert_eq!(report.total_status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_get_health_with_no_targets_is_the_sentinel() {
        let state = test_state(MockProber::new(), &[]);

        let Json(report) = get_health(State(state)).await;

        assert_eq!(report, AggregateReport::unknown());
    }

    #[tokio::test]
    async fn test_heartbeat_returns_ok() {
        assert_eq!(heartbeat().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_broadcast_update_notifies_registered_viewers() {
        let state = test_state(MockProber::new(), &["web"]);
        let (_viewer_id, mut rx) = state.hub.register();

        let body = broadcast_update(
            State(state),
            Query(BroadcastParams {
                reason: Some("ops".to_string()),
            }),
        )
        .await;

        assert!(body.contains("Update signal"));
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.event, UPDATE_EVENT);
        assert_eq!(frame.reason, "ops");
    }
}
