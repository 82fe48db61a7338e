//! WebSocket transport underneath the signaling client.
//!
//! The client never touches a socket directly: it drives a
//! [`SignalingTransport`] and consumes [`TransportEvent`]s from a channel.
//! A single reader task pushes events in arrival order, so the channel
//! preserves the ordering the dispatcher relies on. Tests substitute their
//! own transport through [`TransportFactory`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Result, SignalingError};

/// Events the transport reports to the signaling client.
#[derive(Debug)]
pub enum TransportEvent {
    /// The dial completed and the connection is usable.
    Opened,
    /// One inbound text frame.
    Message(String),
    /// A dial or read failure. Write failures are returned to the caller
    /// of `send_text` instead.
    Error(SignalingError),
    /// The connection is gone. Emitted exactly once per transport.
    Closed,
}

/// Contract between the signaling client and the WebSocket layer.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Install the target URL. Fails once a connection is established.
    fn set_url(&self, url: String) -> Result<()>;

    /// Establish the connection. Emits `Opened` on success; on failure
    /// emits `Error` then `Closed` and returns the error. A `close()`
    /// that lands while the dial is in flight wins: the connection is
    /// discarded and `dial` returns an error without emitting `Opened`.
    async fn dial(&self) -> Result<()>;

    /// Write one text frame. Writes are serialized internally; failures
    /// are returned, not published as events.
    async fn send_text(&self, frame: String) -> Result<()>;

    /// Tear the connection down. Idempotent; the `Closed` event fires
    /// exactly once across the transport's lifetime.
    async fn close(&self);

    /// Arm the read loop. No frame is read until `gate` fires; dropping
    /// the gate sender aborts the loop before it reads anything.
    fn start_reader(self: Arc<Self>, gate: oneshot::Receiver<()>);
}

/// Builds a fresh transport for every `open()`.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> (Arc<dyn SignalingTransport>, mpsc::Receiver<TransportEvent>);
}

/// Default factory producing [`WsTransport`] instances.
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn create(&self) -> (Arc<dyn SignalingTransport>, mpsc::Receiver<TransportEvent>) {
        let (events, receiver) = mpsc::channel(64);
        (Arc::new(WsTransport::new(events)), receiver)
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `tokio-tungstenite` transport for `wss://` signaling endpoints.
pub struct WsTransport {
    url: StdMutex<Option<String>>,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: StdMutex<Option<SplitStream<WsStream>>>,
    events: mpsc::Sender<TransportEvent>,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl WsTransport {
    pub fn new(events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            url: StdMutex::new(None),
            writer: Mutex::new(None),
            reader: StdMutex::new(None),
            events,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    async fn emit(&self, event: TransportEvent) {
        // The receiver disappearing just means nobody is listening anymore.
        let _ = self.events.send(event).await;
    }
}

#[async_trait]
impl SignalingTransport for WsTransport {
    fn set_url(&self, url: String) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(SignalingError::Transport(
                "connection already established".into(),
            ));
        }
        *self.url.lock().unwrap() = Some(url);
        Ok(())
    }

    async fn dial(&self) -> Result<()> {
        let url = self
            .url
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SignalingError::Transport("no url installed".into()))?;

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                let (mut sink, stream) = stream.split();
                {
                    let mut writer = self.writer.lock().await;
                    // close() may have completed while the dial was in
                    // flight; it found nothing to tear down and will not
                    // run again, so the fresh connection must be disposed
                    // of here instead of installed.
                    if self.closed.load(Ordering::SeqCst) {
                        drop(writer);
                        let _ = sink.close().await;
                        return Err(SignalingError::Transport(
                            "connection closed during dial".into(),
                        ));
                    }
                    *writer = Some(sink);
                    *self.reader.lock().unwrap() = Some(stream);
                    self.connected.store(true, Ordering::SeqCst);
                }
                self.emit(TransportEvent::Opened).await;
                Ok(())
            }
            Err(err) => {
                warn!("websocket dial failed: {err}");
                self.emit(TransportEvent::Error(SignalingError::Transport(
                    err.to_string(),
                )))
                .await;
                if !self.closed.swap(true, Ordering::SeqCst) {
                    self.emit(TransportEvent::Closed).await;
                }
                Err(SignalingError::Transport(err.to_string()))
            }
        }
    }

    async fn send_text(&self, frame: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| SignalingError::Transport("connection is not established".into()))?;
        sink.send(Message::Text(frame))
            .await
            .map_err(|err| SignalingError::Transport(err.to_string()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut writer = self.writer.lock().await;
            if let Some(sink) = writer.as_mut() {
                let _ = sink.close().await;
            }
            *writer = None;
        }
        self.emit(TransportEvent::Closed).await;
    }

    fn start_reader(self: Arc<Self>, gate: oneshot::Receiver<()>) {
        tokio::spawn(async move {
            // Wait until dial completion; a dropped gate means the open was
            // abandoned and there is nothing to read.
            if gate.await.is_err() {
                return;
            }
            let stream = self.reader.lock().unwrap().take();
            let Some(mut stream) = stream else {
                return;
            };
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if self.events.send(TransportEvent::Message(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Binary, ping and pong frames are not part of the
                        // signaling protocol.
                        debug!("ignoring non-text websocket frame");
                    }
                    Some(Err(err)) => {
                        if !self.closed.load(Ordering::SeqCst) {
                            self.emit(TransportEvent::Error(SignalingError::Transport(
                                err.to_string(),
                            )))
                            .await;
                        }
                        break;
                    }
                }
            }
            if !self.closed.swap(true, Ordering::SeqCst) {
                self.emit(TransportEvent::Closed).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_url_before_dial_succeeds() {
        let (events, _receiver) = mpsc::channel(8);
        let transport = WsTransport::new(events);
        assert!(transport.set_url("wss://example.com".into()).is_ok());
    }

    #[tokio::test]
    async fn dial_without_url_fails() {
        let (events, _receiver) = mpsc::channel(8);
        let transport = WsTransport::new(events);
        let err = transport.dial().await.unwrap_err();
        assert!(matches!(err, SignalingError::Transport(_)));
    }

    #[tokio::test]
    async fn send_before_dial_fails() {
        let (events, _receiver) = mpsc::channel(8);
        let transport = WsTransport::new(events);
        let err = transport.send_text("{}".into()).await.unwrap_err();
        assert!(matches!(err, SignalingError::Transport(_)));
    }

    #[tokio::test]
    async fn close_emits_exactly_one_closed_event() {
        let (events, mut receiver) = mpsc::channel(8);
        let transport = WsTransport::new(events);
        transport.close().await;
        transport.close().await;

        assert!(matches!(receiver.recv().await, Some(TransportEvent::Closed)));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_the_gate_aborts_the_reader() {
        let (events, mut receiver) = mpsc::channel(8);
        let transport = Arc::new(WsTransport::new(events));
        let (gate_tx, gate_rx) = oneshot::channel();
        transport.start_reader(gate_rx);
        drop(gate_tx);

        // The reader exits without producing any event.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(receiver.try_recv().is_err());
    }
}
