use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use health_checks::HubFrame;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Opens one channel to the broadcast hub.
#[async_trait]
pub trait HubConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn HubChannel>, ChannelError>;
}

/// One established hub channel.
#[async_trait]
pub trait HubChannel: Send {
    async fn send(&mut self, frame: HubFrame) -> Result<(), ChannelError>;
    /// Next inbound frame; `None` once the channel is closed.
    async fn next_frame(&mut self) -> Option<Result<HubFrame, ChannelError>>;
    async fn close(&mut self);
}

pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl HubConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn HubChannel>, ChannelError> {
        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        Ok(Box::new(WsChannel { stream }))
    }
}

pub struct WsChannel {
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl HubChannel for WsChannel {
    async fn send(&mut self, frame: HubFrame) -> Result<(), ChannelError> {
        let payload =
            serde_json::to_string(&frame).map_err(|e| ChannelError::Transport(e.to_string()))?;
        self.stream
            .send(Message::Text(payload))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<HubFrame, ChannelError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<HubFrame>(&text) {
                    Ok(frame) => return Some(Ok(frame)),
                    Err(e) => debug!(error = %e, "ignoring malformed hub frame"),
                },
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Scripted connector: hands out pre-arranged channels (or refusals) in order.
pub struct MockConnector {
    outcomes: Mutex<VecDeque<Result<MockChannel, ChannelError>>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
        }
    }

    /// Script one successful connection; the returned handle drives it.
    pub fn push_accept(&self) -> MockChannelHandle {
        let (channel, handle) = mock_channel();
        self.outcomes.lock().unwrap().push_back(Ok(channel));
        handle
    }

    /// Script one refused connection attempt.
    pub fn push_refuse(&self) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(ChannelError::Connect("connection refused".to_string())));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HubConnector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn HubChannel>, ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.lock().unwrap().pop_front() {
            Some(Ok(channel)) => Ok(Box::new(channel)),
            Some(Err(e)) => Err(e),
            None => Err(ChannelError::Connect("no scripted connection".to_string())),
        }
    }
}

pub struct MockChannel {
    incoming: mpsc::UnboundedReceiver<Result<HubFrame, ChannelError>>,
    sent: mpsc::UnboundedSender<HubFrame>,
}

/// Test-side handle for one [`MockChannel`].
pub struct MockChannelHandle {
    incoming: Mutex<Option<mpsc::UnboundedSender<Result<HubFrame, ChannelError>>>>,
    sent: Mutex<mpsc::UnboundedReceiver<HubFrame>>,
}

pub fn mock_channel() -> (MockChannel, MockChannelHandle) {
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    (
        MockChannel {
            incoming: incoming_rx,
            sent: sent_tx,
        },
        MockChannelHandle {
            incoming: Mutex::new(Some(incoming_tx)),
            sent: Mutex::new(sent_rx),
        },
    )
}

impl MockChannelHandle {
    /// Deliver a frame to the client side, as the hub would.
    pub fn push_frame(&self, frame: HubFrame) {
        if let Some(tx) = self.incoming.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(frame));
        }
    }

    pub fn push_error(&self, error: ChannelError) {
        if let Some(tx) = self.incoming.lock().unwrap().as_ref() {
            let _ = tx.send(Err(error));
        }
    }

    /// Close the channel from the hub side.
    pub fn close(&self) {
        self.incoming.lock().unwrap().take();
    }

    /// Frames the client has invoked on this channel so far.
    pub fn drain_sent(&self) -> Vec<HubFrame> {
        let mut receiver = self.sent.lock().unwrap();
        let mut frames = Vec::new();
        while let Ok(frame) = receiver.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

#[async_trait]
impl HubChannel for MockChannel {
    async fn send(&mut self, frame: HubFrame) -> Result<(), ChannelError> {
        self.sent
            .send(frame)
            .map_err(|_| ChannelError::Transport("mock channel closed".to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<HubFrame, ChannelError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) {
        self.incoming.close();
    }
}
