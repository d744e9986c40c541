//! Async runtime for in-process peers.
//!
//! Each peer runs as a task owning its [`PeerSession`]. Inbound envelopes
//! arrive on an unbounded channel fed by the other peers' transports;
//! local edits arrive as closures sent through a [`PeerHandle`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tablemesh_core::error::SyncError;
use tablemesh_core::identifier::PeerId;
use tablemesh_event_bus::relay::Transport;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::session::PeerSession;

/// Shortest flush period; a zero throttle already flushes on every edit.
const MIN_FLUSH_PERIOD: Duration = Duration::from_millis(1);

type Inboxes = Arc<Mutex<HashMap<PeerId, mpsc::UnboundedSender<Vec<u8>>>>>;

/// Connects in-process peers to each other.
#[derive(Debug, Clone, Default)]
pub struct ChannelHub {
    inboxes: Inboxes,
}

impl ChannelHub {
    /// Creates a hub with no peers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `peer` to the hub, returning its transport and the receiving
    /// end of its inbox. Joining again replaces the previous inbox.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` if the hub's lock is poisoned.
    pub fn connect(
        &self,
        peer: &PeerId,
    ) -> Result<(ChannelTransport, mpsc::UnboundedReceiver<Vec<u8>>), SyncError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.inboxes)?.insert(peer.clone(), sender);
        debug!(peer = %peer, "peer joined hub");
        Ok((
            ChannelTransport {
                peer: peer.clone(),
                inboxes: Arc::clone(&self.inboxes),
            },
            receiver,
        ))
    }

    /// Removes `peer` from the hub; its inbox closes once drained.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` if the hub's lock is poisoned.
    pub fn disconnect(&self, peer: &PeerId) -> Result<(), SyncError> {
        lock(&self.inboxes)?.remove(peer);
        debug!(peer = %peer, "peer left hub");
        Ok(())
    }

    /// Every connected peer, sorted.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` if the hub's lock is poisoned.
    pub fn peers(&self) -> Result<Vec<PeerId>, SyncError> {
        let mut peers: Vec<PeerId> = lock(&self.inboxes)?.keys().cloned().collect();
        peers.sort();
        Ok(peers)
    }
}

fn lock(
    inboxes: &Inboxes,
) -> Result<std::sync::MutexGuard<'_, HashMap<PeerId, mpsc::UnboundedSender<Vec<u8>>>>, SyncError> {
    inboxes
        .lock()
        .map_err(|_| SyncError::Transport("channel hub lock poisoned".into()))
}

/// Transport of one peer on a [`ChannelHub`].
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    peer: PeerId,
    inboxes: Inboxes,
}

impl Transport for ChannelTransport {
    fn send(&self, to: Option<&PeerId>, payload: Vec<u8>) -> Result<(), SyncError> {
        let inboxes = lock(&self.inboxes)?;
        match to {
            Some(peer) => inboxes
                .get(peer)
                .ok_or_else(|| SyncError::Transport(format!("peer {peer} is not connected")))?
                .send(payload)
                .map_err(|_| SyncError::Transport(format!("inbox of {peer} is closed"))),
            None => {
                for (peer, inbox) in inboxes.iter().filter(|(peer, _)| **peer != self.peer) {
                    if inbox.send(payload.clone()).is_err() {
                        debug!(peer = %peer, "skipped closed inbox");
                    }
                }
                Ok(())
            }
        }
    }
}

/// Work sent to a peer task.
pub type PeerCommand = Box<dyn FnOnce(&mut PeerSession) + Send>;

/// Sends work to a running peer task.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    peer: PeerId,
    commands: mpsc::UnboundedSender<PeerCommand>,
}

impl PeerHandle {
    /// Creates a handle and the command stream [`run_peer`] consumes.
    #[must_use]
    pub fn new(peer: PeerId) -> (Self, mpsc::UnboundedReceiver<PeerCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        (Self { peer, commands }, receiver)
    }

    /// The peer this handle drives.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer
    }

    /// Runs `work` against the peer's session and returns its result.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` if the peer task has stopped.
    pub async fn with<R>(
        &self,
        work: impl FnOnce(&mut PeerSession) -> R + Send + 'static,
    ) -> Result<R, SyncError>
    where
        R: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let command: PeerCommand = Box::new(move |session| {
            let _ = reply.send(work(session));
        });
        self.commands
            .send(command)
            .map_err(|_| SyncError::Transport(format!("peer {} has stopped", self.peer)))?;
        result
            .await
            .map_err(|_| SyncError::Transport(format!("peer {} dropped the request", self.peer)))
    }
}

/// Drives `session` until `shutdown` turns true or every input closes.
///
/// Inbound messages and commands are handled in arrival order; recorded
/// changes are flushed every `update_throttle`. Pending changes are flushed
/// once more before the session is handed back.
pub async fn run_peer(
    mut session: PeerSession,
    mut inbox: mpsc::UnboundedReceiver<Vec<u8>>,
    mut commands: mpsc::UnboundedReceiver<PeerCommand>,
    mut shutdown: watch::Receiver<bool>,
) -> PeerSession {
    let period = session.config().update_throttle.max(MIN_FLUSH_PERIOD);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(peer = %session.peer_id(), ?period, "peer runtime started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            message = inbox.recv() => match message {
                Some(bytes) => {
                    session.receive(&bytes);
                }
                None => {
                    warn!(peer = %session.peer_id(), "inbox closed");
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(command) => command(&mut session),
                None => {
                    debug!(peer = %session.peer_id(), "all handles dropped");
                    break;
                }
            },
            _ = ticker.tick() => {
                session.flush();
            }
        }
    }

    session.flush();
    info!(peer = %session.peer_id(), "peer runtime stopped");
    session
}
