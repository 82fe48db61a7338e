//! Per-peer buffering of ICE candidates that arrive ahead of the remote
//! session description.
//!
//! Candidates for a peer must never reach the user before that peer's SDP.
//! Until the SDP shows up they queue here in arrival order; the queue is
//! drained destructively, exactly once, when the SDP lands.

use std::collections::{HashMap, HashSet};

/// Key under which messages from the channel's master are filed when the
/// sender id is absent.
pub(crate) const MASTER_SENDER_KEY: &str = "MASTER";

#[derive(Debug, Default)]
pub(crate) struct PendingIceBuffer {
    received_sdp: HashSet<String>,
    queued: HashMap<String, Vec<String>>,
}

impl PendingIceBuffer {
    /// Resolve the buffer key for an inbound sender id. Viewers receive
    /// everything from the single master, whose frames carry no sender id.
    pub fn sender_key(sender_client_id: &str) -> &str {
        if sender_client_id.is_empty() {
            MASTER_SENDER_KEY
        } else {
            sender_client_id
        }
    }

    /// Whether the remote SDP for `key` has already been observed.
    pub fn has_remote_sdp(&self, key: &str) -> bool {
        self.received_sdp.contains(key)
    }

    /// Queue a candidate that arrived before the SDP for `key`.
    pub fn queue(&mut self, key: &str, candidate: String) {
        self.queued.entry(key.to_string()).or_default().push(candidate);
    }

    /// Record that the SDP for `key` arrived and hand back everything
    /// queued for it, in arrival order. Subsequent calls find nothing.
    pub fn mark_sdp_received(&mut self, key: &str) -> Vec<String> {
        self.received_sdp.insert(key.to_string());
        self.queued.remove(key).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_key_defaults_to_master() {
        assert_eq!(PendingIceBuffer::sender_key(""), "MASTER");
        assert_eq!(PendingIceBuffer::sender_key("viewer-1"), "viewer-1");
    }

    #[test]
    fn drains_in_arrival_order() {
        let mut buffer = PendingIceBuffer::default();
        buffer.queue("MASTER", "candidate-1".into());
        buffer.queue("MASTER", "candidate-2".into());
        buffer.queue("MASTER", "candidate-3".into());

        let drained = buffer.mark_sdp_received("MASTER");
        assert_eq!(drained, vec!["candidate-1", "candidate-2", "candidate-3"]);
    }

    #[test]
    fn drain_is_destructive_and_happens_once() {
        let mut buffer = PendingIceBuffer::default();
        buffer.queue("MASTER", "candidate-1".into());

        assert_eq!(buffer.mark_sdp_received("MASTER").len(), 1);
        assert!(buffer.mark_sdp_received("MASTER").is_empty());
    }

    #[test]
    fn candidates_after_sdp_bypass_the_queue() {
        let mut buffer = PendingIceBuffer::default();
        assert!(buffer.mark_sdp_received("viewer-1").is_empty());
        assert!(buffer.has_remote_sdp("viewer-1"));
        // The dispatcher surfaces these immediately instead of queueing.
    }

    #[test]
    fn keys_are_independent() {
        let mut buffer = PendingIceBuffer::default();
        buffer.queue("viewer-1", "a".into());
        buffer.queue("viewer-2", "b".into());

        assert_eq!(buffer.mark_sdp_received("viewer-1"), vec!["a"]);
        assert!(!buffer.has_remote_sdp("viewer-2"));
        assert_eq!(buffer.mark_sdp_received("viewer-2"), vec!["b"]);
    }
}
