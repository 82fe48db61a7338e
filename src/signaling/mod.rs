//! Signaling channel client: lifecycle state machine, wire codec and
//! candidate-ordering buffer.

mod client;
mod pending;
mod types;

pub use client::{SignalingClient, SignalingClientBuilder};
pub use types::{random_client_id, ConnectionState, InboundFrame, MessageKind, OutboundFrame};
