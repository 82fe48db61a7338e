//! Wire types for the signaling channel.
//!
//! Frames are UTF-8 JSON text messages; payloads travel base64-encoded
//! (standard alphabet with padding). Field names are part of the service
//! contract and case-sensitive.

use serde::{Deserialize, Serialize};

/// The three signaling message kinds, serialized exactly as the service
/// expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "SDP_OFFER")]
    SdpOffer,
    #[serde(rename = "SDP_ANSWER")]
    SdpAnswer,
    #[serde(rename = "ICE_CANDIDATE")]
    IceCandidate,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::SdpOffer => write!(f, "SDP_OFFER"),
            MessageKind::SdpAnswer => write!(f, "SDP_ANSWER"),
            MessageKind::IceCandidate => write!(f, "ICE_CANDIDATE"),
        }
    }
}

/// Lifecycle state of the signaling connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "CLOSED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Open => write!(f, "OPEN"),
            ConnectionState::Closing => write!(f, "CLOSING"),
        }
    }
}

/// Frame sent to the service.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    pub action: MessageKind,
    #[serde(rename = "messagePayload")]
    pub message_payload: String,
    /// Only a master addresses a recipient; serialization drops the field
    /// when empty so viewer frames never carry it.
    #[serde(rename = "recipientClientId", skip_serializing_if = "String::is_empty")]
    pub recipient_client_id: String,
}

/// Frame received from the service. Unknown `messageType` values fail to
/// deserialize and are dropped by the dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "messageType")]
    pub message_type: MessageKind,
    #[serde(rename = "messagePayload", default)]
    pub message_payload: String,
    /// Empty when the message came from the channel's single master.
    #[serde(rename = "senderClientId", default)]
    pub sender_client_id: String,
}

/// Generate a random alphabetic client id of `len` characters, for viewers
/// that do not carry a stable identity of their own.
pub fn random_client_id(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..52);
            match idx {
                0..=25 => (b'a' + idx) as char,
                _ => (b'A' + (idx - 26)) as char,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    const SDP_OFFER: &str = "{\"sdp\":\"offer= true\\nvideo= true\",\"type\":\"offer\"}";

    #[test]
    fn outbound_frame_without_recipient_omits_field() {
        let frame = OutboundFrame {
            action: MessageKind::SdpOffer,
            message_payload: STANDARD.encode(SDP_OFFER),
            recipient_client_id: String::new(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            "{\"action\":\"SDP_OFFER\",\"messagePayload\":\"eyJzZHAiOiJvZmZlcj0gdHJ1ZVxudmlkZW89IHRydWUiLCJ0eXBlIjoib2ZmZXIifQ==\"}"
        );
    }

    #[test]
    fn outbound_frame_with_recipient_carries_field() {
        let frame = OutboundFrame {
            action: MessageKind::SdpOffer,
            message_payload: STANDARD.encode(SDP_OFFER),
            recipient_client_id: "TestClientId".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            "{\"action\":\"SDP_OFFER\",\"messagePayload\":\"eyJzZHAiOiJvZmZlcj0gdHJ1ZVxudmlkZW89IHRydWUiLCJ0eXBlIjoib2ZmZXIifQ==\",\"recipientClientId\":\"TestClientId\"}"
        );
    }

    #[test]
    fn inbound_frame_decodes_with_and_without_sender() {
        let with_sender = "{\"messageType\":\"SDP_OFFER\",\"messagePayload\":\"cGF5bG9hZA==\",\"senderClientId\":\"TestClientId\"}";
        let frame: InboundFrame = serde_json::from_str(with_sender).unwrap();
        assert_eq!(frame.message_type, MessageKind::SdpOffer);
        assert_eq!(frame.sender_client_id, "TestClientId");

        let without_sender =
            "{\"messageType\":\"SDP_ANSWER\",\"messagePayload\":\"cGF5bG9hZA==\"}";
        let frame: InboundFrame = serde_json::from_str(without_sender).unwrap();
        assert_eq!(frame.message_type, MessageKind::SdpAnswer);
        assert_eq!(frame.sender_client_id, "");
    }

    #[test]
    fn unknown_message_type_fails_to_decode() {
        let unknown = "{\"messageType\":\"STATUS_RESPONSE\",\"messagePayload\":\"e30=\"}";
        assert!(serde_json::from_str::<InboundFrame>(unknown).is_err());
    }

    #[test]
    fn payload_base64_round_trips() {
        let encoded = STANDARD.encode(SDP_OFFER);
        let decoded = STANDARD.decode(&encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), SDP_OFFER);
    }

    #[test]
    fn message_kind_wire_names() {
        assert_eq!(MessageKind::SdpOffer.to_string(), "SDP_OFFER");
        assert_eq!(MessageKind::SdpAnswer.to_string(), "SDP_ANSWER");
        assert_eq!(MessageKind::IceCandidate.to_string(), "ICE_CANDIDATE");
        assert_eq!(
            serde_json::to_string(&MessageKind::IceCandidate).unwrap(),
            "\"ICE_CANDIDATE\""
        );
    }

    #[test]
    fn random_client_ids_are_unique_and_alphabetic() {
        let a = random_client_id(16);
        let b = random_client_id(16);
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
