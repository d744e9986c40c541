//! Event catalogue, event records, and the wire envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::identifier::{Identifier, PeerId};

/// A node's synchronized fields changed (or the node appeared).
pub const UPDATE_GAME_OBJECT: &str = "UPDATE_GAME_OBJECT";

/// A node left the graph.
pub const DELETE_GAME_OBJECT: &str = "DELETE_GAME_OBJECT";

/// A chat message record was sent.
pub const BROADCAST_MESSAGE: &str = "BROADCAST_MESSAGE";

/// Local-only selection signal.
pub const SELECT_TABLETOP_OBJECT: &str = "SELECT_TABLETOP_OBJECT";

/// A file collaborator finished loading a file.
pub const FILE_LOADED: &str = "FILE_LOADED";

/// An import collaborator finished parsing an XML document.
pub const XML_PARSE: &str = "XML_PARSE";

/// A peer announces the identifiers and versions it holds.
pub const SYNCHRONIZE_CATALOG: &str = "SYNCHRONIZE_CATALOG";

/// A peer asks for full updates of the listed identifiers.
pub const REQUEST_GAME_OBJECT: &str = "REQUEST_GAME_OBJECT";

/// Field map carried by update notices, keyed by wire field name.
pub type SyncMap = serde_json::Map<String, serde_json::Value>;

/// One delivery of an event to the handlers of one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// The event name.
    pub name: String,
    /// The event payload.
    pub data: serde_json::Value,
    /// The peer that raised the event.
    pub send_from: PeerId,
    /// The single peer the event was addressed to, if any.
    pub send_to: Option<PeerId>,
    /// True only on the peer that raised the event.
    pub is_send_from_self: bool,
}

impl EventRecord {
    /// Decodes the payload into a typed record.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Payload` if the payload does not match `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| SyncError::Payload(format!("{}: {e}", self.name)))
    }
}

/// Encodes a payload record for an event named `name`.
///
/// # Errors
///
/// Returns `SyncError::Payload` if `value` cannot be represented as JSON.
pub fn to_payload<T: Serialize>(name: &str, value: &T) -> Result<serde_json::Value, SyncError> {
    serde_json::to_value(value).map_err(|e| SyncError::Payload(format!("{name}: {e}")))
}

/// The message relayed between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// The event name.
    pub event_name: String,
    /// The event payload.
    pub data: serde_json::Value,
    /// The originating peer.
    pub send_from: PeerId,
    /// The addressed peer; `None` means every peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_to: Option<PeerId>,
}

/// Payload of [`UPDATE_GAME_OBJECT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectUpdate {
    /// The node's identifier.
    pub identifier: Identifier,
    /// The node's alias name, used to instantiate unknown nodes.
    pub alias_name: String,
    /// The node's parent, if it is not a root.
    #[serde(default)]
    pub parent_identifier: Option<Identifier>,
    /// Position among the parent's children.
    #[serde(default)]
    pub index: usize,
    /// Update counter of the sending replica.
    #[serde(default)]
    pub version: u64,
    /// The synchronized fields.
    #[serde(default)]
    pub sync_data: SyncMap,
}

impl ObjectUpdate {
    /// Decodes an update payload one field at a time.
    ///
    /// `identifier` and `aliasName` are required. Any other field that is
    /// present but malformed takes its default and is named in the
    /// returned list, so the rest of the update still applies.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Payload` if the payload is not an object or a
    /// required field is missing or malformed.
    pub fn decode_lenient(value: &serde_json::Value) -> Result<(Self, Vec<&'static str>), SyncError> {
        let object = value
            .as_object()
            .ok_or_else(|| SyncError::Payload(format!("{UPDATE_GAME_OBJECT}: expected an object")))?;
        let mut malformed = Vec::new();
        let update = Self {
            identifier: required_field(object, "identifier")?,
            alias_name: required_field(object, "aliasName")?,
            parent_identifier: optional_field(object, "parentIdentifier", &mut malformed),
            index: optional_field(object, "index", &mut malformed).unwrap_or_default(),
            version: optional_field(object, "version", &mut malformed).unwrap_or_default(),
            sync_data: optional_field(object, "syncData", &mut malformed).unwrap_or_default(),
        };
        Ok((update, malformed))
    }
}

fn required_field<T: DeserializeOwned>(object: &SyncMap, key: &str) -> Result<T, SyncError> {
    let value = object
        .get(key)
        .ok_or_else(|| SyncError::Payload(format!("{UPDATE_GAME_OBJECT}: missing {key}")))?;
    T::deserialize(value).map_err(|e| SyncError::Payload(format!("{UPDATE_GAME_OBJECT}: {key}: {e}")))
}

fn optional_field<T: DeserializeOwned>(
    object: &SyncMap,
    key: &'static str,
    malformed: &mut Vec<&'static str>,
) -> Option<T> {
    match object.get(key) {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => T::deserialize(value).map_or_else(
            |_| {
                malformed.push(key);
                None
            },
            Some,
        ),
    }
}

/// Payload of [`DELETE_GAME_OBJECT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDeleted {
    /// The destroyed node.
    pub identifier: Identifier,
}

/// Payload of [`SELECT_TABLETOP_OBJECT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSelected {
    /// The selected node.
    pub identifier: Identifier,
    /// The selected node's alias name.
    pub class_name: String,
}

/// Payload of [`BROADCAST_MESSAGE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// The message identifier.
    pub identifier: Identifier,
    /// The chat tab the message belongs to.
    pub tab_identifier: Identifier,
    /// The sending peer.
    pub from: PeerId,
    /// The recipient of a whisper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<PeerId>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Free-form tag (e.g. the dice system used).
    #[serde(default)]
    pub tag: String,
    /// Display name of the speaker.
    pub name: String,
    /// The message text.
    pub text: String,
    /// Speaker image.
    #[serde(default)]
    pub image_identifier: String,
    /// The message this one answers (e.g. a roll result).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_identifier: Option<Identifier>,
}

/// Payload of [`FILE_LOADED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLoaded {
    /// Name of the loaded file, including its extension.
    pub file_name: String,
    /// The file's text content.
    pub content: String,
}

/// Payload of [`XML_PARSE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlDocument {
    /// The document text.
    pub xml: String,
}

/// One entry of a [`SYNCHRONIZE_CATALOG`] payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// A live node on the sending peer.
    pub identifier: Identifier,
    /// Its update counter there.
    pub version: u64,
}

/// Payload of [`SYNCHRONIZE_CATALOG`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Every live node of the sending peer.
    pub entries: Vec<CatalogEntry>,
}

/// Payload of [`REQUEST_GAME_OBJECT`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectRequest {
    /// The identifiers whose full state is wanted.
    pub identifiers: Vec<Identifier>,
}
