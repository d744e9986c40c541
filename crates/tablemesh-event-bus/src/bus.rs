//! Prioritized local dispatch.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tablemesh_core::config::DEFAULT_MAX_EVENT_ROUNDS;
use tablemesh_core::event::EventRecord;
use tablemesh_core::identifier::PeerId;
use tracing::{debug, warn};

use crate::outbox::{EventContext, PendingEvent, Route};
use crate::relay::NetworkRelay;

/// Priority used by handlers that do not care about ordering.
pub const DEFAULT_PRIORITY: i32 = 0;

/// An event handler. Receives the delivery and the session context.
pub type Handler<C> = Box<dyn FnMut(&EventRecord, &mut C) + Send>;

struct HandlerEntry<C> {
    owner: String,
    priority: i32,
    handler: Handler<C>,
}

/// Per-peer event bus.
///
/// Handlers for one event run by descending priority, ties in
/// registration order. Events queued on the context's outbox while
/// handlers run are raised after the current dispatch, up to
/// `max_event_rounds` per top-level event.
pub struct EventBus<C> {
    relay: NetworkRelay,
    handlers: HashMap<String, Vec<HandlerEntry<C>>>,
    max_event_rounds: usize,
}

impl<C> fmt::Debug for EventBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("relay", &self.relay)
            .field("events", &self.handlers.len())
            .field("max_event_rounds", &self.max_event_rounds)
            .finish()
    }
}

/// Builder returned by [`EventBus::register`].
pub struct HandlerRegistration<'a, C> {
    bus: &'a mut EventBus<C>,
    owner: String,
}

impl<C> HandlerRegistration<'_, C> {
    /// Adds a handler for `event` owned by this registration's owner.
    pub fn on(
        &mut self,
        event: &str,
        priority: i32,
        handler: impl FnMut(&EventRecord, &mut C) + Send + 'static,
    ) -> &mut Self {
        let list = self.bus.handlers.entry(event.to_owned()).or_default();
        let at = list
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(list.len());
        list.insert(
            at,
            HandlerEntry {
                owner: self.owner.clone(),
                priority,
                handler: Box::new(handler),
            },
        );
        self
    }
}

impl<C: EventContext> EventBus<C> {
    /// Creates a bus that relays through `relay`.
    #[must_use]
    pub fn new(relay: NetworkRelay) -> Self {
        Self {
            relay,
            handlers: HashMap::new(),
            max_event_rounds: DEFAULT_MAX_EVENT_ROUNDS,
        }
    }

    /// Returns the bus with a different follow-up event bound.
    #[must_use]
    pub fn with_max_event_rounds(mut self, rounds: usize) -> Self {
        self.max_event_rounds = rounds;
        self
    }

    /// This peer's identity.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        self.relay.peer_id()
    }

    /// Starts registering handlers owned by `owner`.
    #[must_use = "handlers are only added through `on`"]
    pub fn register(&mut self, owner: &str) -> HandlerRegistration<'_, C> {
        HandlerRegistration {
            bus: self,
            owner: owner.to_owned(),
        }
    }

    /// Removes every handler owned by `owner`. Returns how many were
    /// removed.
    pub fn unregister(&mut self, owner: &str) -> usize {
        let mut removed = 0;
        for list in self.handlers.values_mut() {
            let before = list.len();
            list.retain(|entry| entry.owner != owner);
            removed += before - list.len();
        }
        self.handlers.retain(|_, list| !list.is_empty());
        debug!(owner, removed, "unregistered handlers");
        removed
    }

    /// Number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// Delivers an event to local handlers only.
    pub fn trigger(&mut self, ctx: &mut C, name: &str, data: serde_json::Value) {
        let record = self.local_record(name, data, None);
        self.run(ctx, Some(record));
    }

    /// Relays an event to every peer, then delivers it locally.
    pub fn call(&mut self, ctx: &mut C, name: &str, data: serde_json::Value) {
        self.relay.send(name, &data, None);
        let record = self.local_record(name, data, None);
        self.run(ctx, Some(record));
    }

    /// Delivers an event to one peer. When `peer` is this peer the event
    /// is dispatched locally, otherwise it is only relayed.
    pub fn call_to(&mut self, ctx: &mut C, peer: &PeerId, name: &str, data: serde_json::Value) {
        if peer == self.relay.peer_id() {
            let record = self.local_record(name, data, Some(peer.clone()));
            self.run(ctx, Some(record));
        } else {
            self.relay.send(name, &data, Some(peer));
            self.run(ctx, None);
        }
    }

    /// Dispatches a message received from the transport. Returns false if
    /// the relay dropped it.
    pub fn receive(&mut self, ctx: &mut C, bytes: &[u8]) -> bool {
        let Some(record) = self.relay.decode(bytes) else {
            return false;
        };
        self.run(ctx, Some(record));
        true
    }

    /// Raises whatever is waiting on the context's outbox.
    pub fn flush_outbox(&mut self, ctx: &mut C) {
        self.run(ctx, None);
    }

    fn local_record(&self, name: &str, data: serde_json::Value, send_to: Option<PeerId>) -> EventRecord {
        EventRecord {
            name: name.to_owned(),
            data,
            send_from: self.relay.peer_id().clone(),
            send_to,
            is_send_from_self: true,
        }
    }

    fn run(&mut self, ctx: &mut C, first: Option<EventRecord>) {
        let mut queue: VecDeque<EventRecord> = first.into_iter().collect();
        let mut rounds = 0usize;
        loop {
            while let Some(pending) = ctx.outbox().pop() {
                if rounds >= self.max_event_rounds {
                    let dropped = ctx.outbox().len() + 1;
                    warn!(event = %pending.name, dropped, "follow-up event limit reached");
                    ctx.outbox().clear();
                    break;
                }
                rounds += 1;
                if let Some(record) = self.route(pending) {
                    queue.push_back(record);
                }
            }
            let Some(record) = queue.pop_front() else {
                break;
            };
            self.dispatch(&record, ctx);
        }
    }

    fn route(&self, pending: PendingEvent) -> Option<EventRecord> {
        let PendingEvent { name, data, route } = pending;
        match route {
            Route::Local => Some(self.local_record(&name, data, None)),
            Route::Broadcast => {
                self.relay.send(&name, &data, None);
                Some(self.local_record(&name, data, None))
            }
            Route::Peer(peer) if &peer == self.relay.peer_id() => {
                Some(self.local_record(&name, data, Some(peer)))
            }
            Route::Peer(peer) => {
                self.relay.send(&name, &data, Some(&peer));
                None
            }
        }
    }

    fn dispatch(&mut self, record: &EventRecord, ctx: &mut C) {
        let Some(list) = self.handlers.get_mut(&record.name) else {
            return;
        };
        debug!(
            event = %record.name,
            handlers = list.len(),
            from_self = record.is_send_from_self,
            "dispatching event"
        );
        for entry in list.iter_mut() {
            (entry.handler)(record, ctx);
        }
    }
}
