//! State handed to every event handler of a peer.

use std::fmt;
use std::sync::Arc;

use tablemesh_core::clock::Clock;
use tablemesh_core::identifier::{Identifier, PeerId};
use tablemesh_event_bus::outbox::{EventContext, Outbox};
use tablemesh_tabletop::kind::TabletopStore;

use crate::chat::{ChatLog, MessageEvaluator};

/// A request for an object's full state, to be answered after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    /// The peer that asked.
    pub peer: PeerId,
    /// The object it asked for.
    pub identifier: Identifier,
}

/// Everything the handlers of one peer read and mutate.
pub struct SessionContext {
    peer_id: PeerId,
    /// The peer's replica of the scene graph.
    pub store: TabletopStore,
    /// Chat messages seen by this peer.
    pub chat: ChatLog,
    /// Locally selected object.
    pub selected: Option<Identifier>,
    /// Roots created by XML imports, oldest first.
    pub imported: Vec<Identifier>,
    pub(crate) replies: Vec<PendingReply>,
    pub(crate) evaluator: Option<Box<dyn MessageEvaluator>>,
    clock: Arc<dyn Clock>,
    outbox: Outbox,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("peer_id", &self.peer_id)
            .field("objects", &self.store.len())
            .field("messages", &self.chat.len())
            .field("selected", &self.selected)
            .field("replies", &self.replies.len())
            .field("outbox", &self.outbox.len())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub(crate) fn new(peer_id: PeerId, clock: Arc<dyn Clock>) -> Self {
        Self {
            peer_id,
            store: TabletopStore::new(),
            chat: ChatLog::default(),
            selected: None,
            imported: Vec::new(),
            replies: Vec::new(),
            evaluator: None,
            clock,
            outbox: Outbox::default(),
        }
    }

    /// The local peer.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// The session clock.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

impl EventContext for SessionContext {
    fn outbox(&mut self) -> &mut Outbox {
        &mut self.outbox
    }
}
