//! Peer fan-out of relayed events.

use std::fmt;

use tablemesh_core::error::SyncError;
use tablemesh_core::event::{Envelope, EventRecord};
use tablemesh_core::identifier::PeerId;
use tracing::{debug, warn};

/// Delivers opaque messages to connected peers.
///
/// Delivery is best effort: at-least-once, ordered per sender and
/// receiver, unordered across senders. Implementations never deliver a
/// broadcast back to its sender.
pub trait Transport: Send {
    /// Sends `payload` to `to`, or to every connected peer when `to` is
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` if the message could not be handed
    /// to the network.
    fn send(&self, to: Option<&PeerId>, payload: Vec<u8>) -> Result<(), SyncError>;
}

/// A transport for a peer that is not connected to anyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisconnectedTransport;

impl Transport for DisconnectedTransport {
    fn send(&self, _to: Option<&PeerId>, _payload: Vec<u8>) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Encodes outgoing events as envelopes and decodes incoming ones.
///
/// Transport failures stop here: they are logged and never reach the
/// caller that raised the event.
pub struct NetworkRelay {
    peer_id: PeerId,
    transport: Box<dyn Transport>,
}

impl fmt::Debug for NetworkRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkRelay")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

impl NetworkRelay {
    /// Creates a relay for `peer_id` over `transport`.
    #[must_use]
    pub fn new(peer_id: PeerId, transport: Box<dyn Transport>) -> Self {
        Self { peer_id, transport }
    }

    /// This peer's identity.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Sends an event to `to`, or to every peer.
    pub fn send(&self, name: &str, data: &serde_json::Value, to: Option<&PeerId>) {
        let envelope = Envelope {
            event_name: name.to_owned(),
            data: data.clone(),
            send_from: self.peer_id.clone(),
            send_to: to.cloned(),
        };
        let bytes = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(event = name, error = %e, "could not encode envelope");
                return;
            }
        };
        if let Err(error) = self.transport.send(to, bytes) {
            warn!(event = name, %error, "relay send failed");
        }
    }

    /// Decodes a received message into a remote event record.
    ///
    /// Returns `None` for garbled envelopes, for envelopes addressed to
    /// another peer, and for echoes of this peer's own events.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> Option<EventRecord> {
        let envelope: Envelope = match serde_json::from_slice(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropped garbled envelope");
                return None;
            }
        };
        if envelope.send_from == self.peer_id {
            debug!(event = %envelope.event_name, "dropped echo of own event");
            return None;
        }
        if envelope
            .send_to
            .as_ref()
            .is_some_and(|to| to != &self.peer_id)
        {
            debug!(event = %envelope.event_name, "dropped envelope addressed to another peer");
            return None;
        }
        Some(EventRecord {
            name: envelope.event_name,
            data: envelope.data,
            send_from: envelope.send_from,
            send_to: envelope.send_to,
            is_send_from_self: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    #[derive(Default, Clone)]
    struct Capture(Arc<Mutex<Vec<(Option<PeerId>, Vec<u8>)>>>);

    impl Transport for Capture {
        fn send(&self, to: Option<&PeerId>, payload: Vec<u8>) -> Result<(), SyncError> {
            self.0.lock().unwrap().push((to.cloned(), payload));
            Ok(())
        }
    }

    struct Refusing;

    impl Transport for Refusing {
        fn send(&self, _to: Option<&PeerId>, _payload: Vec<u8>) -> Result<(), SyncError> {
            Err(SyncError::Transport("link down".into()))
        }
    }

    #[test]
    fn test_send_encodes_envelope_with_origin() {
        // Arrange
        let capture = Capture::default();
        let relay = NetworkRelay::new(PeerId::from("alice"), Box::new(capture.clone()));

        // Act
        relay.send("PING", &json!({ "n": 1 }), None);

        // Assert
        let sent = capture.0.lock().unwrap();
        let envelope: Envelope = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(envelope.event_name, "PING");
        assert_eq!(envelope.send_from, PeerId::from("alice"));
        assert_eq!(envelope.data, json!({ "n": 1 }));
        assert!(sent[0].0.is_none());
    }

    #[test]
    fn test_send_swallows_transport_failure() {
        let relay = NetworkRelay::new(PeerId::from("alice"), Box::new(Refusing));

        relay.send("PING", &json!(null), None);
    }

    #[test]
    fn test_decode_marks_record_as_remote() {
        let sender = NetworkRelay::new(PeerId::from("alice"), Box::new(DisconnectedTransport));
        let receiver = NetworkRelay::new(PeerId::from("bob"), Box::new(DisconnectedTransport));
        let bytes = serde_json::to_vec(&Envelope {
            event_name: "PING".to_owned(),
            data: json!(1),
            send_from: sender.peer_id().clone(),
            send_to: None,
        })
        .unwrap();

        let record = receiver.decode(&bytes).unwrap();

        assert!(!record.is_send_from_self);
        assert_eq!(record.send_from, PeerId::from("alice"));
        assert!(sender.decode(&bytes).is_none());
    }

    #[test]
    fn test_decode_drops_other_recipients_and_garbage() {
        let relay = NetworkRelay::new(PeerId::from("bob"), Box::new(DisconnectedTransport));
        let for_carol = serde_json::to_vec(&Envelope {
            event_name: "PING".to_owned(),
            data: json!(1),
            send_from: PeerId::from("alice"),
            send_to: Some(PeerId::from("carol")),
        })
        .unwrap();

        assert!(relay.decode(&for_carol).is_none());
        assert!(relay.decode(b"{not json").is_none());
    }
}
