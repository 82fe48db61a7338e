//! Client library for AWS Kinesis Video Streams WebRTC signaling channels.
//!
//! Connects to a signaling channel over a secure WebSocket authenticated
//! with a SigV4-presigned URL, and exchanges SDP offers, SDP answers and
//! ICE candidates between a `MASTER` and its `VIEWER` peers. Candidates
//! that arrive before the remote session description are buffered per peer
//! and surfaced, in order, once that description lands.

pub mod config;
pub mod error;
pub mod signaling;
pub mod signer;
pub mod transport;

pub use config::{Config, Role};
pub use error::{Result, SignalingError};
pub use signaling::{
    random_client_id, ConnectionState, MessageKind, SignalingClient, SignalingClientBuilder,
};
pub use signer::{
    Credentials, CredentialsProvider, DateProvider, QueryParams, RequestSigner, SigV4Signer,
};
pub use transport::{
    SignalingTransport, TransportEvent, TransportFactory, WsTransport, WsTransportFactory,
};
