//! WebSocket transport for the client.
//!
//! [`spawn`] opens a WebSocket for a [`TransportRequest`] in a background
//! task and bridges it to channels. This is a thin layer that moves STOMP
//! text frames; protocol logic remains in the sans-IO [`crate::Client`].
//!
//! Every event carries the [`TransportId`] it was spawned with, so a driver
//! that replaced a transport can discard late events from the old one.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use studyhall_core::TransportRequest;
use studyhall_proto::Frame;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
    },
};
use tracing::{debug, warn};

/// How long a closing transport may take to flush queued writes.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Handshake request could not be built.
    #[error("invalid request: {0}")]
    Request(String),

    /// WebSocket connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Read or write failed on an open socket.
    #[error("stream error: {0}")]
    Stream(String),

    /// Broker closed the socket.
    #[error("closed by broker: {0}")]
    Closed(String),
}

/// Identifies one spawned transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub u64);

/// What happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// WebSocket handshake completed.
    Opened,
    /// A STOMP frame arrived.
    Frame(Frame),
    /// A heart-beat arrived.
    Heartbeat,
    /// The transport is gone. Always the last event.
    Closed {
        /// Why it closed.
        reason: String,
    },
}

/// Event from a spawned transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Transport that produced the event.
    pub id: TransportId,
    /// What happened.
    pub kind: TransportEventKind,
}

/// Handle to a spawned transport.
///
/// Outbound text is queued on a channel and written by the background task.
/// [`TransportHandle::close`] flushes the queue before closing the socket;
/// dropping the handle aborts at once.
pub struct TransportHandle {
    id: TransportId,
    outbound: mpsc::UnboundedSender<String>,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    /// Identifier this transport reports events with.
    pub fn id(&self) -> TransportId {
        self.id
    }

    /// Queue a frame for sending.
    pub fn send_frame(&self, frame: &Frame) {
        self.send_text(frame.encode());
    }

    /// Queue a heart-beat.
    pub fn send_heartbeat(&self) {
        self.send_text(Frame::HEARTBEAT.to_string());
    }

    /// Close the transport once every queued write has gone out.
    ///
    /// The returned task finishes when the socket is closed, or after
    /// [`CLOSE_TIMEOUT`] when the broker stops reading; the transport is
    /// aborted in that case. Must be called inside a tokio runtime.
    pub fn close(mut self) -> JoinHandle<()> {
        let id = self.id;
        let task = self.task.take();
        // Dropping the sender ends the write loop after the queue drains.
        drop(self);

        tokio::spawn(async move {
            let Some(mut task) = task else {
                return;
            };
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                warn!(id = id.0, "transport did not close in time, aborting");
                task.abort();
            }
        })
    }

    fn send_text(&self, text: String) {
        if self.outbound.send(text).is_err() {
            debug!(id = self.id.0, "transport task gone, dropping outbound text");
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Open a WebSocket for `request` in a background task.
///
/// Events go to `events`: `Opened` once the handshake completes, then
/// `Frame`/`Heartbeat` as data arrives, and finally exactly one `Closed`
/// (unless the handle was dropped first).
pub fn spawn(
    id: TransportId,
    request: TransportRequest,
    events: mpsc::Sender<TransportEvent>,
) -> TransportHandle {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
    let task = tokio::spawn(run_transport(id, request, outbound_rx, events));

    TransportHandle { id, outbound: outbound_tx, task: Some(task) }
}

/// Run the transport, reporting its end as a `Closed` event.
async fn run_transport(
    id: TransportId,
    request: TransportRequest,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<TransportEvent>,
) {
    let reason = match pump(id, request, &mut outbound, &events).await {
        Ok(()) => "connection closed".to_string(),
        Err(e) => e.to_string(),
    };
    debug!(id = id.0, %reason, "transport finished");

    // Receiver gone means the driver shut down; nobody left to tell.
    let _ = events.send(TransportEvent { id, kind: TransportEventKind::Closed { reason } }).await;
}

async fn pump(
    id: TransportId,
    request: TransportRequest,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::Sender<TransportEvent>,
) -> Result<(), TransportError> {
    let mut http = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::Request(e.to_string()))?;
    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Request(format!("header {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Request(format!("header {name}: {e}")))?;
        http.headers_mut().insert(name, value);
    }

    let (stream, _response) =
        connect_async(http).await.map_err(|e| TransportError::Connection(e.to_string()))?;
    let (mut sink, mut source) = stream.split();

    if !emit(events, id, TransportEventKind::Opened).await {
        return Ok(());
    }

    loop {
        tokio::select! {
            // Queued writes go out before anything else is read.
            biased;

            outgoing = outbound.recv() => match outgoing {
                Some(text) => sink
                    .send(Message::text(text))
                    .await
                    .map_err(|e| TransportError::Stream(format!("write failed: {e}")))?,
                None => {
                    let _ = sink.close().await;
                    return Ok(());
                },
            },
            incoming = source.next() => {
                let kind = match incoming {
                    Some(Ok(Message::Text(text))) => match Frame::decode(text.as_str()) {
                        Ok(Some(frame)) => TransportEventKind::Frame(frame),
                        Ok(None) => TransportEventKind::Heartbeat,
                        Err(e) => {
                            warn!(id = id.0, "dropping undecodable frame: {}", e);
                            continue;
                        },
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map_or_else(
                            || "no reason given".to_string(),
                            |f| format!("{} {}", f.code, f.reason.as_str()),
                        );
                        return Err(TransportError::Closed(reason));
                    },
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(TransportError::Stream(e.to_string())),
                    None => return Ok(()),
                };
                if !emit(events, id, kind).await {
                    return Ok(());
                }
            },
        }
    }
}

/// Forward an event. `false` once the driver stopped listening.
async fn emit(
    events: &mpsc::Sender<TransportEvent>,
    id: TransportId,
    kind: TransportEventKind,
) -> bool {
    events.send(TransportEvent { id, kind }).await.is_ok()
}
