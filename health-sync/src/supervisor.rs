use health_checks::{HubFrame, CLIENT_UPDATE_EVENT, UPDATE_EVENT};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::ReconnectBackoff;
use crate::transport::{ChannelError, HubChannel, HubConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Notifications delivered to the supervisor's consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSignal {
    /// The channel (re)connected; consumers should bootstrap over HTTP.
    Connected,
    /// A hub event reached a registered listener.
    HubEvent { event: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub backoff: ReconnectBackoff,
    /// Event names registered exactly once per logical session.
    pub session_events: Vec<String>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            backoff: ReconnectBackoff::default(),
            session_events: vec![UPDATE_EVENT.to_string(), CLIENT_UPDATE_EVENT.to_string()],
        }
    }
}

enum Command {
    Start,
    Stop,
    Invoke(HubFrame),
}

/// Event-name → signal-sink registrations for the current logical session.
///
/// Duplicate registrations under one name would fan every hub event out more
/// than once; the supervisor's session guard is what prevents that.
#[derive(Default)]
struct ListenerSet {
    entries: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<SyncSignal>>>>,
}

impl ListenerSet {
    fn add(&self, event: &str, tx: mpsc::UnboundedSender<SyncSignal>) {
        self.entries
            .lock()
            .unwrap()
            .entry(event.to_string())
            .or_default()
            .push(tx);
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn dispatch(&self, frame: &HubFrame) -> usize {
        let entries = self.entries.lock().unwrap();
        let Some(listeners) = entries.get(&frame.event) else {
            return 0;
        };
        let mut delivered = 0;
        for tx in listeners {
            let signal = SyncSignal::HubEvent {
                event: frame.event.clone(),
                reason: frame.reason.clone(),
            };
            if tx.send(signal).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn count(&self, event: &str) -> usize {
        self.entries.lock().unwrap().get(event).map_or(0, Vec::len)
    }
}

struct Shared {
    connector: Arc<dyn HubConnector>,
    options: SupervisorOptions,
    listeners: ListenerSet,
    signals: mpsc::UnboundedSender<SyncSignal>,
    keep_alive: AtomicBool,
    session_registered: AtomicBool,
    state_tx: watch::Sender<ConnectionState>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }

    /// One-time setup for a logical session; a transport-level reconnect
    /// re-enters `Connected` with the guard still set and registers nothing.
    fn register_session_listeners(&self) {
        if self.session_registered.swap(true, Ordering::SeqCst) {
            debug!("session listeners already registered; skipping");
            return;
        }
        for event in &self.options.session_events {
            self.listeners.add(event, self.signals.clone());
        }
        debug!(
            events = self.options.session_events.len(),
            "session listeners registered"
        );
    }

    /// Full teardown: the next `start()` opens a brand-new logical session.
    fn teardown_session(&self) {
        self.set_state(ConnectionState::Closing);
        self.listeners.clear();
        self.session_registered.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        info!("connection supervision stopped");
    }
}

/// Supervises one logical hub session: connects, watches for closes,
/// reconnects with backoff, and keeps listener registration idempotent.
///
/// All connection work happens on a single owned task, which is what
/// guarantees at most one transport attempt in flight at a time.
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ConnectionSupervisor {
    pub fn new(
        connector: Arc<dyn HubConnector>,
        options: SupervisorOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SyncSignal>) {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            connector,
            options,
            listeners: ListenerSet::default(),
            signals: signals_tx,
            keep_alive: AtomicBool::new(false),
            session_registered: AtomicBool::new(false),
            state_tx,
        });
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(Arc::clone(&shared), commands_rx));

        (
            Self {
                shared,
                commands: commands_tx,
                state_rx,
                task,
            },
            signals_rx,
        )
    }

    /// Begin supervision. A no-op while already connecting or connected.
    pub fn start(&self) {
        self.shared.keep_alive.store(true, Ordering::SeqCst);
        let _ = self.commands.send(Command::Start);
    }

    /// Disable auto-reconnect and close the channel. Safe to call repeatedly.
    pub fn stop(&self) {
        self.shared.keep_alive.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Stop);
    }

    /// Invoke a hub event; dropped with a warning when not connected.
    pub fn invoke(&self, event: impl Into<String>, reason: impl Into<String>) {
        let frame = HubFrame {
            event: event.into(),
            reason: reason.into(),
        };
        let _ = self.commands.send(Command::Invoke(frame));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Listener registrations under `event` in the current session.
    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.listeners.count(event)
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum ConnectedEvent {
    Frame(Option<Result<HubFrame, ChannelError>>),
    Command(Option<Command>),
}

enum BackoffOutcome {
    Retry,
    Stopped,
    Shutdown,
}

async fn run(shared: Arc<Shared>, mut commands: mpsc::UnboundedReceiver<Command>) {
    'idle: loop {
        // Disconnected: wait for a start request.
        loop {
            match commands.recv().await {
                Some(Command::Start) if shared.keep_alive.load(Ordering::SeqCst) => break,
                Some(Command::Start) => {}
                Some(Command::Stop) => shared.teardown_session(),
                Some(Command::Invoke(frame)) => {
                    warn!(event = %frame.event, "cannot invoke while disconnected");
                }
                None => return,
            }
        }

        let mut attempt: u32 = 0;
        'connect: loop {
            shared.set_state(ConnectionState::Connecting);
            debug!(attempt, "connecting to hub");

            let mut connect = shared.connector.connect();
            let outcome = loop {
                tokio::select! {
                    outcome = &mut connect => break outcome,
                    command = commands.recv() => match command {
                        Some(Command::Stop) => {
                            shared.teardown_session();
                            continue 'idle;
                        }
                        Some(Command::Start) => {}
                        Some(Command::Invoke(frame)) => {
                            warn!(event = %frame.event, "cannot invoke while connecting");
                        }
                        None => return,
                    }
                }
            };

            let mut channel = match outcome {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(error = %e, "connection attempt failed");
                    shared.set_state(ConnectionState::Disconnected);
                    match wait_backoff(&shared, &mut commands, attempt).await {
                        BackoffOutcome::Retry => {
                            attempt = attempt.saturating_add(1);
                            continue 'connect;
                        }
                        BackoffOutcome::Stopped => continue 'idle,
                        BackoffOutcome::Shutdown => return,
                    }
                }
            };

            attempt = 0;
            shared.set_state(ConnectionState::Connected);
            info!("connected to hub");
            shared.register_session_listeners();
            let _ = shared.signals.send(SyncSignal::Connected);

            // Connected: pump hub frames and commands until close or stop.
            loop {
                let event = tokio::select! {
                    frame = channel.next_frame() => ConnectedEvent::Frame(frame),
                    command = commands.recv() => ConnectedEvent::Command(command),
                };

                match event {
                    ConnectedEvent::Frame(Some(Ok(frame))) => {
                        let delivered = shared.listeners.dispatch(&frame);
                        debug!(
                            event = %frame.event,
                            reason = %frame.reason,
                            delivered,
                            "hub event dispatched"
                        );
                    }
                    ConnectedEvent::Frame(Some(Err(e))) => {
                        warn!(error = %e, "channel transport error");
                        break;
                    }
                    ConnectedEvent::Frame(None) => break,
                    ConnectedEvent::Command(Some(Command::Stop)) => {
                        channel.close().await;
                        shared.teardown_session();
                        continue 'idle;
                    }
                    // Listener registration is session-guarded, so a
                    // redundant start is a pure no-op here.
                    ConnectedEvent::Command(Some(Command::Start)) => {}
                    ConnectedEvent::Command(Some(Command::Invoke(frame))) => {
                        if let Err(e) = channel.send(frame).await {
                            warn!(error = %e, "hub invocation failed");
                        }
                    }
                    ConnectedEvent::Command(None) => return,
                }
            }

            // Transport-level close: retry within the same logical session,
            // unless supervision has been disabled meanwhile.
            if !shared.keep_alive.load(Ordering::SeqCst) {
                shared.teardown_session();
                continue 'idle;
            }
            shared.set_state(ConnectionState::Disconnected);
            match wait_backoff(&shared, &mut commands, attempt).await {
                BackoffOutcome::Retry => {
                    attempt = attempt.saturating_add(1);
                    info!("reconnecting after channel close");
                    continue 'connect;
                }
                BackoffOutcome::Stopped => continue 'idle,
                BackoffOutcome::Shutdown => return,
            }
        }
    }
}

async fn wait_backoff(
    shared: &Shared,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    attempt: u32,
) -> BackoffOutcome {
    let delay = shared.options.backoff.next(attempt);
    debug!(delay_ms = delay.as_millis() as u64, attempt, "reconnect scheduled");

    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return BackoffOutcome::Retry,
            command = commands.recv() => match command {
                Some(Command::Stop) => {
                    shared.teardown_session();
                    return BackoffOutcome::Stopped;
                }
                Some(Command::Start) => {}
                Some(Command::Invoke(frame)) => {
                    warn!(event = %frame.event, "cannot invoke while disconnected");
                }
                None => return BackoffOutcome::Shutdown,
            }
        }
    }
}
