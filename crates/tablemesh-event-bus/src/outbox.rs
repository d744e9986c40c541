//! Follow-up events queued by handlers.
//!
//! Handlers run while the bus is borrowed, so they cannot raise events
//! directly. They push them here instead; the bus drains the outbox after
//! each dispatch.

use std::collections::VecDeque;

use tablemesh_core::identifier::PeerId;

/// Where a queued event goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Local handlers only.
    Local,
    /// Every peer, this one included.
    Broadcast,
    /// One peer only.
    Peer(PeerId),
}

/// An event waiting to be raised.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    /// The event name.
    pub name: String,
    /// The event payload.
    pub data: serde_json::Value,
    /// Where the event goes.
    pub route: Route,
}

/// FIFO queue of follow-up events.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<PendingEvent>,
}

impl Outbox {
    /// Queues a local-only event.
    pub fn trigger(&mut self, name: &str, data: serde_json::Value) {
        self.push(name, data, Route::Local);
    }

    /// Queues an event for every peer.
    pub fn call(&mut self, name: &str, data: serde_json::Value) {
        self.push(name, data, Route::Broadcast);
    }

    /// Queues an event for one peer.
    pub fn call_to(&mut self, peer: PeerId, name: &str, data: serde_json::Value) {
        self.push(name, data, Route::Peer(peer));
    }

    fn push(&mut self, name: &str, data: serde_json::Value, route: Route) {
        self.queue.push_back(PendingEvent {
            name: name.to_owned(),
            data,
            route,
        });
    }

    /// Removes the oldest queued event.
    pub fn pop(&mut self) -> Option<PendingEvent> {
        self.queue.pop_front()
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drops every queued event.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Handler context that carries an outbox.
pub trait EventContext {
    /// The queue follow-up events are pushed to.
    fn outbox(&mut self) -> &mut Outbox;
}
