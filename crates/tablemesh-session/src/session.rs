//! The per-peer session: one store, one bus, one relay.

use std::sync::Arc;

use serde::Serialize;
use tablemesh_core::clock::Clock;
use tablemesh_core::config::MeshConfig;
use tablemesh_core::error::SyncError;
use tablemesh_core::event::{
    BROADCAST_MESSAGE, ChatMessage, DELETE_GAME_OBJECT, FILE_LOADED, FileLoaded, ObjectDeleted,
    ObjectSelected, SELECT_TABLETOP_OBJECT, SYNCHRONIZE_CATALOG, UPDATE_GAME_OBJECT, XML_PARSE,
    XmlDocument, to_payload,
};
use tablemesh_core::identifier::{Identifier, PeerId};
use tablemesh_event_bus::bus::EventBus;
use tablemesh_event_bus::relay::{NetworkRelay, Transport};
use tablemesh_object::node::NodeTree;
use tablemesh_object::store::ObjectChange;
use tablemesh_tabletop::character::GameCharacter;
use tablemesh_tabletop::kind::{TabletopKind, TabletopStore};
use tracing::{debug, info, warn};

use crate::chat::{ChatDraft, ChatLog, MessageEvaluator};
use crate::context::SessionContext;
use crate::handlers;

/// One peer's view of the shared table.
///
/// Local edits go through the store and are recorded there; [`flush`]
/// turns the recorded changes into `UPDATE_GAME_OBJECT` and
/// `DELETE_GAME_OBJECT` notices. With a zero update throttle every edit made
/// through the session flushes at once; otherwise the peer runtime flushes
/// on a timer.
///
/// [`flush`]: Self::flush
#[derive(Debug)]
pub struct PeerSession {
    config: MeshConfig,
    bus: EventBus<SessionContext>,
    context: SessionContext,
}

impl PeerSession {
    /// Creates a session sending through `transport`.
    #[must_use]
    pub fn new(config: MeshConfig, transport: Box<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let relay = NetworkRelay::new(config.peer_id.clone(), transport);
        let mut bus = EventBus::new(relay).with_max_event_rounds(config.max_event_rounds);
        handlers::register(&mut bus);
        info!(peer = %config.peer_id, "peer session created");
        Self {
            context: SessionContext::new(config.peer_id.clone(), clock),
            config,
            bus,
        }
    }

    /// Installs the evaluator for chat commands sent from this peer.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl MessageEvaluator + 'static) -> Self {
        self.context.evaluator = Some(Box::new(evaluator));
        self
    }

    /// This peer's identity.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.config.peer_id
    }

    /// The session's configuration.
    #[must_use]
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// The local replica.
    #[must_use]
    pub fn store(&self) -> &TabletopStore {
        &self.context.store
    }

    /// Chat messages seen so far.
    #[must_use]
    pub fn chat(&self) -> &ChatLog {
        &self.context.chat
    }

    /// The locally selected object.
    #[must_use]
    pub fn selected(&self) -> Option<&Identifier> {
        self.context.selected.as_ref()
    }

    /// Roots created by XML imports, oldest first.
    #[must_use]
    pub fn imported(&self) -> &[Identifier] {
        &self.context.imported
    }

    /// The bus, for registering further handlers.
    pub fn bus_mut(&mut self) -> &mut EventBus<SessionContext> {
        &mut self.bus
    }

    /// Registers a new object tree, optionally under `parent`.
    ///
    /// # Errors
    ///
    /// See [`ObjectStore::insert_tree`](tablemesh_object::store::ObjectStore::insert_tree).
    pub fn add_object(
        &mut self,
        tree: NodeTree<TabletopKind>,
        parent: Option<&Identifier>,
    ) -> Result<Identifier, SyncError> {
        self.edit(|store| store.insert_tree(tree, parent))
    }

    /// Duplicates an object under fresh identifiers and registers the copy
    /// beside the original.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the
    /// original is not live.
    pub fn duplicate(&mut self, identifier: &Identifier) -> Result<Identifier, SyncError> {
        self.edit(|store| {
            let copy = store.clone_subtree(identifier)?;
            let parent = store.parent_of(identifier).map(|p| p.identifier().clone());
            store.insert_tree(copy, parent.as_ref())
        })
    }

    /// Records an update of `identifier`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the object
    /// is not live.
    pub fn update(&mut self, identifier: &Identifier) -> Result<(), SyncError> {
        self.edit(|store| store.update(identifier))
    }

    /// Destroys an object and its subtree.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the object
    /// is not live.
    pub fn destroy(&mut self, identifier: &Identifier) -> Result<Vec<Identifier>, SyncError> {
        self.edit(|store| store.destroy(identifier))
    }

    /// Runs `change` against the store, then flushes if the update throttle
    /// is zero. Changes made before an error are kept and still flushed.
    ///
    /// # Errors
    ///
    /// Returns whatever `change` returns.
    pub fn edit<R>(
        &mut self,
        change: impl FnOnce(&mut TabletopStore) -> Result<R, SyncError>,
    ) -> Result<R, SyncError> {
        let result = change(&mut self.context.store);
        self.flush_if_immediate();
        result
    }

    fn flush_if_immediate(&mut self) {
        if self.config.update_throttle.is_zero() {
            self.flush();
        }
    }

    /// Evaluates a line of a character's chat palette with the configured
    /// substitution limit.
    ///
    /// # Errors
    ///
    /// Returns an error if `character` is not a live character.
    pub fn evaluate_palette(&mut self, character: &Identifier, line: &str) -> Result<String, SyncError> {
        let limit = self.config.placeholder_iteration_limit;
        self.edit(|store| {
            GameCharacter::open(store, character)?.evaluate_palette_with_limit(line, limit)
        })
    }

    /// Broadcasts every recorded change and returns how many notices went
    /// out.
    pub fn flush(&mut self) -> usize {
        let changes = self.context.store.take_changes();
        if changes.is_empty() {
            return 0;
        }
        debug!(peer = %self.config.peer_id, changes = changes.len(), "flushing changes");
        let mut sent = 0;
        for change in changes {
            match change {
                ObjectChange::Updated(identifier) => {
                    let Some(update) = self.context.store.snapshot(&identifier) else {
                        continue;
                    };
                    if self.call(UPDATE_GAME_OBJECT, &update) {
                        sent += 1;
                    }
                }
                ObjectChange::Deleted(identifier) => {
                    if self.call(DELETE_GAME_OBJECT, &ObjectDeleted { identifier }) {
                        sent += 1;
                    }
                }
            }
        }
        sent
    }

    /// Handles one message from the transport. Returns false if it was
    /// dropped (garbled, addressed elsewhere, or an echo).
    pub fn receive(&mut self, bytes: &[u8]) -> bool {
        let accepted = self.bus.receive(&mut self.context, bytes);
        self.answer_requests();
        accepted
    }

    /// Sends a chat message to every peer and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Payload` if the message cannot be encoded.
    pub fn send_chat_message(&mut self, draft: ChatDraft) -> Result<Identifier, SyncError> {
        let message = ChatMessage {
            identifier: Identifier::generate(),
            tab_identifier: draft.tab_identifier,
            from: self.config.peer_id.clone(),
            to: draft.to,
            timestamp: self.context.clock().now_millis(),
            tag: draft.tag,
            name: draft.name,
            text: draft.text,
            image_identifier: draft.image_identifier,
            response_identifier: None,
        };
        let data = to_payload(BROADCAST_MESSAGE, &message)?;
        self.bus.call(&mut self.context, BROADCAST_MESSAGE, data);
        Ok(message.identifier)
    }

    /// Selects an object on this peer only.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` if the object is not live.
    pub fn select(&mut self, identifier: &Identifier) -> Result<(), SyncError> {
        let node = self
            .context
            .store
            .get(identifier)
            .ok_or_else(|| SyncError::ObjectNotFound(identifier.clone()))?;
        let selected = ObjectSelected {
            identifier: identifier.clone(),
            class_name: node.alias_name().to_owned(),
        };
        let data = to_payload(SELECT_TABLETOP_OBJECT, &selected)?;
        self.bus.trigger(&mut self.context, SELECT_TABLETOP_OBJECT, data);
        Ok(())
    }

    /// Imports an XML document as a new root object. The import is local;
    /// the created objects replicate like any other addition.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Payload` if the document cannot be encoded.
    pub fn import_xml(&mut self, xml: &str) -> Result<(), SyncError> {
        let data = to_payload(XML_PARSE, &XmlDocument { xml: xml.to_owned() })?;
        self.bus.trigger(&mut self.context, XML_PARSE, data);
        self.flush_if_immediate();
        Ok(())
    }

    /// Reports a file handed over by a file collaborator. XML files are
    /// imported.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Payload` if the file cannot be encoded.
    pub fn file_loaded(&mut self, file_name: &str, content: &str) -> Result<(), SyncError> {
        let file = FileLoaded {
            file_name: file_name.to_owned(),
            content: content.to_owned(),
        };
        let data = to_payload(FILE_LOADED, &file)?;
        self.bus.trigger(&mut self.context, FILE_LOADED, data);
        self.flush_if_immediate();
        Ok(())
    }

    /// Serializes an object's subtree.
    #[must_use]
    pub fn export_xml(&self, identifier: &Identifier) -> Option<String> {
        self.context.store.to_xml(identifier)
    }

    /// Announces this peer's catalogue to a newly connected peer, which
    /// then requests whatever it lacks.
    pub fn peer_connected(&mut self, peer: &PeerId) {
        let catalog = self.context.store.catalog();
        info!(peer = %peer, objects = catalog.entries.len(), "announcing catalogue");
        match to_payload(SYNCHRONIZE_CATALOG, &catalog) {
            Ok(data) => self.bus.call_to(&mut self.context, peer, SYNCHRONIZE_CATALOG, data),
            Err(error) => warn!(%error, "could not encode catalogue"),
        }
    }

    fn call<T: Serialize>(&mut self, name: &str, value: &T) -> bool {
        match to_payload(name, value) {
            Ok(data) => {
                self.bus.call(&mut self.context, name, data);
                true
            }
            Err(error) => {
                warn!(event = name, %error, "could not encode notice");
                false
            }
        }
    }

    fn answer_requests(&mut self) {
        for reply in std::mem::take(&mut self.context.replies) {
            let Some(update) = self.context.store.snapshot(&reply.identifier) else {
                debug!(identifier = %reply.identifier, peer = %reply.peer, "requested object is gone");
                continue;
            };
            match to_payload(UPDATE_GAME_OBJECT, &update) {
                Ok(data) => self
                    .bus
                    .call_to(&mut self.context, &reply.peer, UPDATE_GAME_OBJECT, data),
                Err(error) => warn!(%error, "could not encode requested object"),
            }
        }
    }
}
