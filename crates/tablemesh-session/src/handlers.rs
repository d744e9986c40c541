//! Handlers every peer session registers on its bus.
//!
//! Replica reconciliation acts only on remote deliveries: the origin peer
//! already holds the state it announced. Chat evaluation acts only on the
//! origin's own delivery, so a command is evaluated once across the mesh.
//! Selection and import signals are local and ignore remote copies.

use serde::de::DeserializeOwned;
use tablemesh_core::event::{
    BROADCAST_MESSAGE, Catalog, ChatMessage, DELETE_GAME_OBJECT, EventRecord, FILE_LOADED,
    FileLoaded, ObjectDeleted, ObjectRequest, ObjectSelected, ObjectUpdate, REQUEST_GAME_OBJECT,
    SELECT_TABLETOP_OBJECT, SYNCHRONIZE_CATALOG, UPDATE_GAME_OBJECT, XML_PARSE, XmlDocument,
    to_payload,
};
use tablemesh_core::identifier::Identifier;
use tablemesh_event_bus::bus::EventBus;
use tablemesh_event_bus::outbox::EventContext;
use tablemesh_object::store::ApplyOutcome;
use tablemesh_object::xml::parse_xml;
use tablemesh_tabletop::kind::{TabletopKind, TabletopStore};
use tracing::{debug, info, warn};

use crate::context::{PendingReply, SessionContext};

/// Owner of the replica reconciliation handlers.
pub const REPLICATION_OWNER: &str = "replication";
/// Owner of the chat handlers.
pub const CHAT_OWNER: &str = "chat";
/// Owner of the catalogue handshake handlers.
pub const CATALOG_OWNER: &str = "catalog";
/// Owner of the local selection and import handlers.
pub const LOCAL_SIGNALS_OWNER: &str = "local-signals";

/// Session handlers run before handlers registered at the default priority.
pub const SESSION_PRIORITY: i32 = 100;

pub(crate) fn register(bus: &mut EventBus<SessionContext>) {
    bus.register(REPLICATION_OWNER)
        .on(UPDATE_GAME_OBJECT, SESSION_PRIORITY, on_update)
        .on(DELETE_GAME_OBJECT, SESSION_PRIORITY, on_delete);
    bus.register(CHAT_OWNER)
        .on(BROADCAST_MESSAGE, SESSION_PRIORITY, on_chat_message);
    bus.register(CATALOG_OWNER)
        .on(SYNCHRONIZE_CATALOG, SESSION_PRIORITY, on_catalog)
        .on(REQUEST_GAME_OBJECT, SESSION_PRIORITY, on_object_request);
    bus.register(LOCAL_SIGNALS_OWNER)
        .on(SELECT_TABLETOP_OBJECT, SESSION_PRIORITY, on_select)
        .on(FILE_LOADED, SESSION_PRIORITY, on_file_loaded)
        .on(XML_PARSE, SESSION_PRIORITY, on_xml_parse);
}

fn decode<T: DeserializeOwned>(record: &EventRecord) -> Option<T> {
    match record.payload() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(from = %record.send_from, %error, "dropped event with bad payload");
            None
        }
    }
}

fn on_update(record: &EventRecord, ctx: &mut SessionContext) {
    if record.is_send_from_self {
        return;
    }
    let update = match ObjectUpdate::decode_lenient(&record.data) {
        Ok((update, malformed)) if malformed.is_empty() => update,
        Ok((mut update, malformed)) => {
            warn!(
                identifier = %update.identifier,
                from = %record.send_from,
                ?malformed,
                "defaulted malformed update fields"
            );
            if malformed.iter().any(|field| matches!(*field, "parentIdentifier" | "index")) {
                keep_local_placement(&ctx.store, &mut update);
            }
            update
        }
        Err(error) => {
            warn!(from = %record.send_from, %error, "dropped event with bad payload");
            return;
        }
    };
    match ctx.store.apply_update(&update) {
        ApplyOutcome::Created(report) | ApplyOutcome::Updated(report) if !report.is_clean() => {
            warn!(
                identifier = %update.identifier,
                from = %record.send_from,
                rejected = ?report.rejected,
                "rejected remote fields"
            );
        }
        ApplyOutcome::Created(_) | ApplyOutcome::Updated(_) | ApplyOutcome::Ignored(_) => {}
    }
}

/// Points a garbled update at the node's current parent and position, so
/// it cannot move a live replica.
fn keep_local_placement(store: &TabletopStore, update: &mut ObjectUpdate) {
    let Some(node) = store.get(&update.identifier) else {
        return;
    };
    update.parent_identifier = node.parent().cloned();
    update.index = node
        .parent()
        .and_then(|parent| store.get(parent))
        .and_then(|parent| parent.children().iter().position(|id| id == &update.identifier))
        .unwrap_or_default();
}

fn on_delete(record: &EventRecord, ctx: &mut SessionContext) {
    if record.is_send_from_self {
        return;
    }
    if let Some(deleted) = decode::<ObjectDeleted>(record) {
        let removed = ctx.store.apply_delete(&deleted.identifier);
        debug!(identifier = %deleted.identifier, removed = removed.len(), "applied remote delete");
    }
}

fn on_chat_message(record: &EventRecord, ctx: &mut SessionContext) {
    let Some(message) = decode::<ChatMessage>(record) else {
        return;
    };
    let own = ctx.peer_id();
    if message
        .to
        .as_ref()
        .is_some_and(|to| to != own && &message.from != own)
    {
        return;
    }
    if !ctx.chat.push(message.clone()) {
        return;
    }
    if !record.is_send_from_self || message.response_identifier.is_some() {
        return;
    }
    let Some(text) = ctx
        .evaluator
        .as_mut()
        .and_then(|evaluator| evaluator.evaluate(&message))
    else {
        return;
    };

    let response = ChatMessage {
        identifier: Identifier::generate(),
        tab_identifier: message.tab_identifier.clone(),
        from: ctx.peer_id().clone(),
        to: message.to.clone(),
        timestamp: ctx.clock().now_millis(),
        tag: message.tag.clone(),
        name: message.name.clone(),
        text,
        image_identifier: message.image_identifier.clone(),
        response_identifier: Some(message.identifier.clone()),
    };
    match to_payload(BROADCAST_MESSAGE, &response) {
        Ok(data) => ctx.outbox().call(BROADCAST_MESSAGE, data),
        Err(error) => warn!(%error, "could not encode evaluation result"),
    }
}

fn on_catalog(record: &EventRecord, ctx: &mut SessionContext) {
    if record.is_send_from_self {
        return;
    }
    let Some(catalog) = decode::<Catalog>(record) else {
        return;
    };
    let identifiers: Vec<Identifier> = catalog
        .entries
        .iter()
        .filter(|entry| ctx.store.is_behind(entry))
        .map(|entry| entry.identifier.clone())
        .collect();
    debug!(
        from = %record.send_from,
        announced = catalog.entries.len(),
        missing = identifiers.len(),
        "compared catalogue"
    );
    if identifiers.is_empty() {
        return;
    }
    match to_payload(REQUEST_GAME_OBJECT, &ObjectRequest { identifiers }) {
        Ok(data) => ctx
            .outbox()
            .call_to(record.send_from.clone(), REQUEST_GAME_OBJECT, data),
        Err(error) => warn!(%error, "could not encode object request"),
    }
}

fn on_object_request(record: &EventRecord, ctx: &mut SessionContext) {
    if record.is_send_from_self {
        return;
    }
    let Some(request) = decode::<ObjectRequest>(record) else {
        return;
    };
    ctx.replies
        .extend(request.identifiers.into_iter().map(|identifier| PendingReply {
            peer: record.send_from.clone(),
            identifier,
        }));
}

fn on_select(record: &EventRecord, ctx: &mut SessionContext) {
    if !record.is_send_from_self {
        return;
    }
    if let Some(selected) = decode::<ObjectSelected>(record) {
        ctx.selected = Some(selected.identifier);
    }
}

fn on_file_loaded(record: &EventRecord, ctx: &mut SessionContext) {
    if !record.is_send_from_self {
        return;
    }
    let Some(file) = decode::<FileLoaded>(record) else {
        return;
    };
    let is_xml = std::path::Path::new(&file.file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
    if !is_xml {
        debug!(file = %file.file_name, "ignored non-xml file");
        return;
    }
    match to_payload(XML_PARSE, &XmlDocument { xml: file.content }) {
        Ok(data) => ctx.outbox().trigger(XML_PARSE, data),
        Err(error) => warn!(%error, "could not encode xml document"),
    }
}

fn on_xml_parse(record: &EventRecord, ctx: &mut SessionContext) {
    if !record.is_send_from_self {
        return;
    }
    let Some(document) = decode::<XmlDocument>(record) else {
        return;
    };
    let tree = match parse_xml::<TabletopKind>(&document.xml) {
        Ok(tree) => tree,
        Err(error) => {
            warn!(%error, "could not import xml document");
            return;
        }
    };
    match ctx.store.insert_tree(tree, None) {
        Ok(identifier) => {
            info!(%identifier, "imported object from xml");
            ctx.imported.push(identifier);
        }
        Err(error) => warn!(%error, "could not register imported object"),
    }
}
