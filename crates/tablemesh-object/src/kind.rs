//! The contract every node kind fulfils.

use std::fmt;

use crate::data_element::DataElement;
use crate::schema::{ApplyReport, SyncMap};

/// A closed set of node kinds stored in an [`ObjectStore`](crate::store::ObjectStore).
///
/// Implementations are expected to be enums with one variant per kind,
/// delegating to a [`SyncSchema`](crate::schema::SyncSchema) per variant.
/// One variant must wrap a [`DataElement`] so that generic data trees can
/// live in the same store as the objects that own them.
pub trait NodeKind: Clone + fmt::Debug + Send + 'static {
    /// Logical type tag, used for registry queries and as the XML tag.
    fn alias_name(&self) -> &'static str;

    /// Creates a default-valued node of the kind registered under
    /// `alias_name`, or `None` if the alias is unknown.
    fn instantiate(alias_name: &str) -> Option<Self>;

    /// Exports the synchronized fields.
    fn sync_fields(&self) -> SyncMap;

    /// Overwrites synchronized fields from a received map.
    fn apply_sync_fields(&mut self, fields: &SyncMap) -> ApplyReport;

    /// Exports the fields as XML attributes, in a stable order.
    fn xml_attributes(&self) -> Vec<(String, String)>;

    /// Applies one XML attribute. See
    /// [`SyncSchema::read_text_field`](crate::schema::SyncSchema::read_text_field).
    fn apply_xml_attribute(&mut self, name: &str, text: &str) -> Option<bool>;

    /// Text content emitted between the XML tags, if the kind has any.
    fn xml_text(&self) -> Option<String> {
        None
    }

    /// Applies the text content read from XML.
    fn apply_xml_text(&mut self, _text: &str) {}

    /// Recomputes derived state after the fields changed, locally or from
    /// a remote update.
    fn refresh(&mut self) {}

    /// Returns the wrapped data element, if this is one.
    fn as_data_element(&self) -> Option<&DataElement>;

    /// Returns the wrapped data element mutably, if this is one.
    fn as_data_element_mut(&mut self) -> Option<&mut DataElement>;

    /// Wraps a data element.
    fn from_data_element(element: DataElement) -> Self;
}
