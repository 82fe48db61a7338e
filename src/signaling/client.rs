//! The signaling client: lifecycle state machine, frame codec, handler
//! dispatch and pending-candidate ordering.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::{Config, Role};
use crate::error::{Result, SignalingError};
use crate::signaling::pending::PendingIceBuffer;
use crate::signaling::types::{ConnectionState, InboundFrame, MessageKind, OutboundFrame};
use crate::signer::{CredentialsProvider, DateProvider, QueryParams, RequestSigner, SigV4Signer};
use crate::transport::{SignalingTransport, TransportEvent, TransportFactory, WsTransportFactory};

type Callback = Arc<dyn Fn() + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&SignalingError) + Send + Sync>;
/// Receives the decoded payload and the sender client id (empty when the
/// message came from the master).
type MessageCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Default)]
struct HandlerSlots {
    on_open: Option<Callback>,
    on_close: Option<Callback>,
    on_error: Option<ErrorCallback>,
    on_sdp_offer: Option<MessageCallback>,
    on_sdp_answer: Option<MessageCallback>,
    on_ice_candidate: Option<MessageCallback>,
}

/// Client for one signaling channel.
///
/// `open()` returns immediately; connection progress and inbound messages
/// are delivered through the installed handlers, which run on a background
/// task and must not block indefinitely. The client is reusable once the
/// `Closed` state is observed again.
pub struct SignalingClient {
    config: Config,
    signer: Arc<dyn RequestSigner>,
    date_provider: DateProvider,
    transport_factory: Box<dyn TransportFactory>,
    state: StdMutex<ConnectionState>,
    transport: StdMutex<Option<Arc<dyn SignalingTransport>>>,
    handlers: StdMutex<HandlerSlots>,
    pending: StdMutex<PendingIceBuffer>,
}

/// Assembles a [`SignalingClient`], optionally overriding the signer, the
/// date provider or the transport.
pub struct SignalingClientBuilder {
    config: Config,
    signer: Option<Arc<dyn RequestSigner>>,
    date_provider: Option<DateProvider>,
    transport_factory: Option<Box<dyn TransportFactory>>,
}

impl SignalingClientBuilder {
    pub fn signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn date_provider(mut self, date_provider: DateProvider) -> Self {
        self.date_provider = Some(date_provider);
        self
    }

    pub fn transport_factory(mut self, factory: Box<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<Arc<SignalingClient>> {
        self.config.validate()?;

        let signer: Arc<dyn RequestSigner> = match self.signer {
            Some(signer) => signer,
            None => {
                let provider = match &self.config.credentials {
                    Some(credentials) => CredentialsProvider::Static(credentials.clone()),
                    None => CredentialsProvider::Chain,
                };
                Arc::new(SigV4Signer::new(self.config.region.clone(), provider))
            }
        };
        let date_provider = self
            .date_provider
            .unwrap_or_else(|| DateProvider::new(self.config.system_clock_offset_ms));
        let transport_factory = self
            .transport_factory
            .unwrap_or_else(|| Box::new(WsTransportFactory));

        Ok(Arc::new(SignalingClient {
            config: self.config,
            signer,
            date_provider,
            transport_factory,
            state: StdMutex::new(ConnectionState::Closed),
            transport: StdMutex::new(None),
            handlers: StdMutex::new(HandlerSlots::default()),
            pending: StdMutex::new(PendingIceBuffer::default()),
        }))
    }
}

impl SignalingClient {
    /// Validate `config` and build a client with the default SigV4 signer
    /// and WebSocket transport.
    pub fn new(config: Config) -> Result<Arc<Self>> {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> SignalingClientBuilder {
        SignalingClientBuilder {
            config,
            signer: None,
            date_provider: None,
            transport_factory: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    // Handler registration. A single slot per event; installing replaces
    // any previous handler. Handlers may be installed from within another
    // handler (the slots are not held locked during dispatch).

    pub fn on_open(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.handlers.lock().unwrap().on_open = Some(Arc::new(handler));
    }

    pub fn on_close(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.handlers.lock().unwrap().on_close = Some(Arc::new(handler));
    }

    pub fn on_error(&self, handler: impl Fn(&SignalingError) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().on_error = Some(Arc::new(handler));
    }

    pub fn on_sdp_offer(&self, handler: impl Fn(&str, &str) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().on_sdp_offer = Some(Arc::new(handler));
    }

    pub fn on_sdp_answer(&self, handler: impl Fn(&str, &str) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().on_sdp_answer = Some(Arc::new(handler));
    }

    pub fn on_ice_candidate(&self, handler: impl Fn(&str, &str) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().on_ice_candidate = Some(Arc::new(handler));
    }

    /// Start connecting. Returns as soon as the connection attempt is
    /// underway; completion is reported through the open handler, failures
    /// through the error handler.
    pub fn open(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != ConnectionState::Closed {
                drop(state);
                let err = SignalingError::AlreadyOpen;
                self.emit_error(&err);
                return Err(err);
            }
            *state = ConnectionState::Connecting;
        }

        let (transport, events) = self.transport_factory.create();
        *self.transport.lock().unwrap() = Some(transport.clone());

        let dispatcher = Arc::clone(self);
        tokio::spawn(dispatcher.run_event_loop(events));

        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.connect(transport).await });
        Ok(())
    }

    /// Request a graceful shutdown. No-op when already closed; duplicate
    /// calls produce a single close event.
    pub async fn close(&self) {
        let transport = self.transport.lock().unwrap().clone();
        match transport {
            Some(transport) => {
                {
                    let mut state = self.state.lock().unwrap();
                    match *state {
                        // Already closed, or a close is already in flight.
                        ConnectionState::Closed | ConnectionState::Closing => return,
                        ConnectionState::Open => *state = ConnectionState::Closing,
                        // Connecting stays as it is until the transport's
                        // close event lands.
                        ConnectionState::Connecting => {}
                    }
                }
                transport.close().await;
            }
            None => {
                // A dial that never produced a transport event would leave
                // the caller wedged in Connecting; synthesize the close.
                let fire = {
                    let mut state = self.state.lock().unwrap();
                    if *state == ConnectionState::Connecting {
                        *state = ConnectionState::Closed;
                        true
                    } else {
                        false
                    }
                };
                if fire {
                    self.emit_close();
                }
            }
        }
    }

    pub async fn send_sdp_offer(&self, payload: &str, recipient_client_id: Option<&str>) -> Result<()> {
        self.send_message(MessageKind::SdpOffer, payload, recipient_client_id)
            .await
    }

    pub async fn send_sdp_answer(&self, payload: &str, recipient_client_id: Option<&str>) -> Result<()> {
        self.send_message(MessageKind::SdpAnswer, payload, recipient_client_id)
            .await
    }

    pub async fn send_ice_candidate(&self, payload: &str, recipient_client_id: Option<&str>) -> Result<()> {
        self.send_message(MessageKind::IceCandidate, payload, recipient_client_id)
            .await
    }

    async fn send_message(
        &self,
        kind: MessageKind,
        payload: &str,
        recipient_client_id: Option<&str>,
    ) -> Result<()> {
        let is_open = { *self.state.lock().unwrap() == ConnectionState::Open };
        if !is_open {
            let err = SignalingError::NotOpen;
            self.emit_error(&err);
            return Err(err);
        }

        let recipient = recipient_client_id.unwrap_or("");
        if self.config.role == Role::Viewer && !recipient.is_empty() {
            let err = SignalingError::ViewerMustNotAddressRecipient;
            self.emit_error(&err);
            return Err(err);
        }

        let frame = OutboundFrame {
            action: kind,
            message_payload: STANDARD.encode(payload),
            recipient_client_id: recipient.to_string(),
        };
        let encoded = serde_json::to_string(&frame)
            .map_err(|err| SignalingError::Transport(format!("frame encoding failed: {err}")))?;

        let transport = self.transport.lock().unwrap().clone();
        let Some(transport) = transport else {
            let err = SignalingError::NotOpen;
            self.emit_error(&err);
            return Err(err);
        };
        if let Err(err) = transport.send_text(encoded).await {
            self.emit_error(&err);
            return Err(err);
        }
        debug!("sent {kind} frame");
        Ok(())
    }

    /// Presign the channel endpoint and dial it. Runs on its own task so
    /// `open()` never blocks.
    async fn connect(self: Arc<Self>, transport: Arc<dyn SignalingTransport>) {
        let mut query = QueryParams::new();
        query.insert("X-Amz-channelARN".into(), self.config.channel_arn.clone());
        if self.config.role == Role::Viewer {
            if let Some(client_id) = &self.config.client_id {
                query.insert("X-Amz-ClientID".into(), client_id.clone());
            }
        }

        let signed_url = match self.signer.get_signed_url(
            &self.config.channel_endpoint,
            &query,
            Some(self.date_provider.now()),
        ) {
            Ok(url) => url,
            Err(err) => {
                self.abort_connect(&err);
                return;
            }
        };

        // Close() may have been requested while presigning.
        if self.state() != ConnectionState::Connecting {
            return;
        }

        if let Err(err) = transport.set_url(signed_url) {
            self.abort_connect(&err);
            return;
        }

        // The reader must not touch the connection before the dial returns;
        // the gate releases it exactly once. If the dial fails the gate
        // sender is dropped and the reader exits without reading.
        let (gate_tx, gate_rx) = oneshot::channel();
        transport.clone().start_reader(gate_rx);
        if transport.dial().await.is_err() {
            // The transport published whatever events apply (a dial error
            // plus close, or just the close that interrupted the dial).
            return;
        }
        let _ = gate_tx.send(());
    }

    /// Abandon an open before any transport event was produced.
    fn abort_connect(&self, err: &SignalingError) {
        warn!("aborting signaling connection attempt: {err}");
        self.emit_error(err);
        let release = {
            let mut state = self.state.lock().unwrap();
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Closed;
                true
            } else {
                false
            }
        };
        if release {
            *self.transport.lock().unwrap() = None;
        }
    }

    async fn run_event_loop(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Opened => {
                    let opened = {
                        let mut state = self.state.lock().unwrap();
                        if *state == ConnectionState::Connecting {
                            *state = ConnectionState::Open;
                            true
                        } else {
                            false
                        }
                    };
                    if opened {
                        self.emit_open();
                    }
                }
                TransportEvent::Message(text) => self.handle_message(&text),
                TransportEvent::Error(err) => self.emit_error(&err),
                TransportEvent::Closed => {
                    *self.state.lock().unwrap() = ConnectionState::Closed;
                    *self.transport.lock().unwrap() = None;
                    self.emit_close();
                    break;
                }
            }
        }
    }

    /// Decode and dispatch one inbound frame. Anything malformed is
    /// dropped so a single bad message cannot kill the stream.
    fn handle_message(&self, raw: &str) {
        let frame: InboundFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("dropping undecodable signaling frame: {err}");
                return;
            }
        };
        let payload = match STANDARD.decode(&frame.message_payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("dropping frame with invalid base64 payload: {err}");
                return;
            }
        };
        let payload = match String::from_utf8(payload) {
            Ok(payload) => payload,
            Err(_) => {
                debug!("dropping frame with non-utf8 payload");
                return;
            }
        };

        let sender = frame.sender_client_id.as_str();
        match frame.message_type {
            MessageKind::SdpOffer => {
                self.emit_message(|slots| slots.on_sdp_offer.clone(), "sdp offer", &payload, sender);
                self.release_pending(sender);
            }
            MessageKind::SdpAnswer => {
                self.emit_message(|slots| slots.on_sdp_answer.clone(), "sdp answer", &payload, sender);
                self.release_pending(sender);
            }
            MessageKind::IceCandidate => self.route_ice_candidate(&payload, sender),
        }
    }

    /// Surface a candidate now if the sender's SDP was already seen,
    /// otherwise queue it until that SDP arrives.
    fn route_ice_candidate(&self, candidate: &str, sender: &str) {
        let queued = {
            let mut pending = self.pending.lock().unwrap();
            let key = PendingIceBuffer::sender_key(sender);
            if pending.has_remote_sdp(key) {
                false
            } else {
                pending.queue(key, candidate.to_string());
                true
            }
        };
        if queued {
            debug!("queued ice candidate ahead of remote description");
        } else {
            self.emit_message(
                |slots| slots.on_ice_candidate.clone(),
                "ice candidate",
                candidate,
                sender,
            );
        }
    }

    /// Mark the sender's SDP as received and flush everything buffered for
    /// it, in arrival order, through the ice-candidate handler.
    fn release_pending(&self, sender: &str) {
        let drained = {
            let mut pending = self.pending.lock().unwrap();
            pending.mark_sdp_received(PendingIceBuffer::sender_key(sender))
        };
        for candidate in drained {
            self.emit_message(
                |slots| slots.on_ice_candidate.clone(),
                "ice candidate",
                &candidate,
                sender,
            );
        }
    }

    // Dispatch helpers. The relevant slot is cloned out before invocation
    // so a handler can install handlers without deadlocking.

    fn emit_open(&self) {
        let handler = self.handlers.lock().unwrap().on_open.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn emit_close(&self) {
        let handler = self.handlers.lock().unwrap().on_close.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn emit_error(&self, err: &SignalingError) {
        let handler = self.handlers.lock().unwrap().on_error.clone();
        match handler {
            Some(handler) => handler(err),
            None => warn!("signaling error with no handler installed: {err}"),
        }
    }

    fn emit_message(
        &self,
        slot: impl Fn(&HandlerSlots) -> Option<MessageCallback>,
        label: &str,
        payload: &str,
        sender: &str,
    ) {
        let handler = slot(&self.handlers.lock().unwrap());
        match handler {
            Some(handler) => handler(payload, sender),
            None => debug!("no {label} handler installed; dropping message"),
        }
    }
}
