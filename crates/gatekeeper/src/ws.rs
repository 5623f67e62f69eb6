//! tokio-tungstenite implementation of [`Transport`].
//!
//! Each `connect` spawns one task that owns the socket. Outbound frames go
//! to it over a channel; everything it observes is posted back into the
//! session input channel as [`TransportEvent`]s.

use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use crate::runtime::SessionInput;
use crate::transport::{Transport, TransportError, TransportEvent, CLOSE_ABNORMAL};

/// Status reported when the peer's close frame carries no code.
const CLOSE_NO_STATUS: u16 = 1005;

/// How long a closing connection waits for the peer to echo the close frame.
const CLOSE_HANDSHAKE_GRACE: Duration = Duration::from_secs(2);

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

type ClosingSlot = Arc<Mutex<Option<JoinHandle<()>>>>;

pub struct WsTransport {
    events: UnboundedSender<SessionInput>,
    outbound: Option<UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
    closing: ClosingSlot,
}

impl WsTransport {
    pub fn new(events: UnboundedSender<SessionInput>) -> Self {
        Self {
            events,
            outbound: None,
            task: None,
            closing: Arc::default(),
        }
    }

    /// Handle for waiting on the close handshake after the transport itself
    /// has been dropped along with its session.
    pub fn shutdown_handle(&self) -> WsShutdown {
        WsShutdown {
            closing: self.closing.clone(),
        }
    }

    fn abort_current(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, endpoint: &Url) -> Result<(), TransportError> {
        self.abort_current();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let events = self.events.clone();
        let endpoint = endpoint.to_string();
        self.task = Some(runtime.spawn(run_connection(endpoint, rx, events)));
        self.outbound = Some(tx);
        Ok(())
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        tx.send(Outbound::Text(text))
            .map_err(|_| TransportError::NotOpen)
    }

    /// Queues the close frame and leaves the connection task to finish the
    /// handshake. Dropping the transport afterwards does not abort it.
    fn close(&mut self, code: u16, reason: &str) {
        let Some(tx) = self.outbound.take() else {
            return;
        };
        let _ = tx.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
        if let Some(task) = self.task.take() {
            let mut closing = self
                .closing
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *closing = Some(task);
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.abort_current();
    }
}

/// Waits for a connection that was closed with [`Transport::close`].
#[derive(Clone)]
pub struct WsShutdown {
    closing: ClosingSlot,
}

impl WsShutdown {
    /// Waits up to `bound` for the close handshake, then gives up on it.
    /// Returns whether the connection task finished in time.
    pub async fn wait(&self, bound: Duration) -> bool {
        let task = self
            .closing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut task) = task else {
            return true;
        };
        match timeout(bound, &mut task).await {
            Ok(_) => true,
            Err(_) => {
                debug!("Close handshake did not finish within {:?}", bound);
                task.abort();
                false
            }
        }
    }
}

async fn run_connection(
    endpoint: String,
    mut outbound: UnboundedReceiver<Outbound>,
    events: UnboundedSender<SessionInput>,
) {
    let emit = |event: TransportEvent| {
        if events.send(SessionInput::Transport(event)).is_err() {
            debug!("Session gone; dropping transport event");
        }
    };
    let abnormal = |message: String| {
        emit(TransportEvent::Error(message));
        emit(TransportEvent::Closed {
            code: CLOSE_ABNORMAL,
            reason: String::new(),
        });
    };

    let (socket, _response) = match connect_async(endpoint.as_str()).await {
        Ok(pair) => pair,
        Err(err) => {
            abnormal(format!("connect failed: {err}"));
            return;
        }
    };
    emit(TransportEvent::Opened);

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        abnormal(format!("send failed: {err}"));
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(err) = sink.send(Message::Close(Some(frame))).await {
                        debug!("Close frame not delivered: {}", err);
                    } else {
                        let echoed = timeout(CLOSE_HANDSHAKE_GRACE, async {
                            while let Some(Ok(message)) = stream.next().await {
                                if message.is_close() {
                                    break;
                                }
                            }
                        })
                        .await;
                        if echoed.is_err() {
                            debug!("Peer did not answer the close frame");
                        }
                    }
                    emit(TransportEvent::Closed { code, reason });
                    return;
                }
                None => {
                    let _ = sink.close().await;
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => emit(TransportEvent::Message(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => emit(TransportEvent::Message(text)),
                    Err(_) => warn!("Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    emit(TransportEvent::Closed { code, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    abnormal(err.to_string());
                    return;
                }
                None => {
                    emit(TransportEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: String::new(),
                    });
                    return;
                }
            },
        }
    }
}
