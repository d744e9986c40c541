//! Test transports: in-memory `Transport` implementations for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use tablemesh_core::error::SyncError;
use tablemesh_core::event::Envelope;
use tablemesh_core::identifier::PeerId;
use tablemesh_event_bus::relay::Transport;

#[derive(Debug, Default)]
struct MeshState {
    inboxes: BTreeMap<PeerId, VecDeque<Vec<u8>>>,
    sent: usize,
}

/// An in-memory mesh. Every peer that asked for a transport is connected
/// to every other one; messages wait in per-peer inboxes until the test
/// delivers them.
#[derive(Debug, Clone, Default)]
pub struct LoopbackMesh {
    state: Arc<Mutex<MeshState>>,
}

impl LoopbackMesh {
    /// Creates an empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects `peer` and returns its transport.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn transport(&self, peer: &PeerId) -> LoopbackTransport {
        self.state
            .lock()
            .unwrap()
            .inboxes
            .entry(peer.clone())
            .or_default();
        LoopbackTransport {
            peer: peer.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// Disconnects `peer`, dropping its undelivered messages. Later
    /// broadcasts skip it.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn disconnect(&self, peer: &PeerId) {
        self.state.lock().unwrap().inboxes.remove(peer);
    }

    /// Removes and returns every message waiting for `peer`, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn drain(&self, peer: &PeerId) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .inboxes
            .get_mut(peer)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    /// Number of messages waiting for `peer`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn pending(&self, peer: &PeerId) -> usize {
        self.state
            .lock()
            .unwrap()
            .inboxes
            .get(peer)
            .map_or(0, VecDeque::len)
    }

    /// Number of messages waiting across the whole mesh.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn total_pending(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .inboxes
            .values()
            .map(VecDeque::len)
            .sum()
    }

    /// Number of `send` calls made through the mesh so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn sent(&self) -> usize {
        self.state.lock().unwrap().sent
    }
}

/// One peer's end of a [`LoopbackMesh`].
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    peer: PeerId,
    state: Arc<Mutex<MeshState>>,
}

impl Transport for LoopbackTransport {
    fn send(&self, to: Option<&PeerId>, payload: Vec<u8>) -> Result<(), SyncError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SyncError::Transport("loopback mesh poisoned".into()))?;
        state.sent += 1;
        match to {
            Some(to) => {
                if let Some(inbox) = state.inboxes.get_mut(to) {
                    inbox.push_back(payload);
                }
            }
            None => {
                for (peer, inbox) in &mut state.inboxes {
                    if peer != &self.peer {
                        inbox.push_back(payload.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

/// A transport that records every message and delivers nothing.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<(Option<PeerId>, Vec<u8>)>>>,
}

impl RecordingTransport {
    /// Creates an empty recording transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded messages decoded as envelopes, skipping any
    /// that do not decode.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, bytes)| serde_json::from_slice(bytes).ok())
            .collect()
    }

    /// Names of the recorded events, in send order.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.envelopes().into_iter().map(|e| e.event_name).collect()
    }

    /// Recipients of the recorded messages; `None` for broadcasts.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn recipients(&self) -> Vec<Option<PeerId>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(to, _)| to.clone())
            .collect()
    }

    /// Forgets the recorded messages.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Transport for RecordingTransport {
    fn send(&self, to: Option<&PeerId>, payload: Vec<u8>) -> Result<(), SyncError> {
        self.sent
            .lock()
            .map_err(|_| SyncError::Transport("recording transport poisoned".into()))?
            .push((to.cloned(), payload));
        Ok(())
    }
}

/// A transport that always fails. Useful for testing that relay failures
/// never reach callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingTransport;

impl Transport for FailingTransport {
    fn send(&self, _to: Option<&PeerId>, _payload: Vec<u8>) -> Result<(), SyncError> {
        Err(SyncError::Transport("connection refused".into()))
    }
}
