//! Data element tree: a generic attributed tree for arbitrary game data.
//!
//! Character sheets, notes, and image references are all modelled as
//! nested data elements, so one mechanism synchronizes, clones, and
//! serializes every game system's data.

use std::collections::BTreeMap;
use std::fmt;

use tablemesh_core::identifier::Identifier;
use tablemesh_core::value::DataValue;
use tracing::warn;

use crate::kind::NodeKind;
use crate::node::Node;
use crate::schema::{ApplyReport, SyncMap, SyncSchema, decode_field, encode_field};
use crate::store::ObjectStore;

/// Alias name of data element nodes.
pub const DATA_ELEMENT_ALIAS: &str = "data";

/// Attribute holding the element type.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Attribute holding the current value of resource-like elements.
pub const CURRENT_VALUE_ATTRIBUTE: &str = "currentValue";

/// XML attribute marking an element whose text is a number. Text without
/// it is always read back as text.
pub const VALUE_TYPE_ATTRIBUTE: &str = "valueType";

const NUMBER_VALUE_TYPE: &str = "number";

/// Known values of the `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataElementType {
    /// A boolean flag; on when the value is non-empty.
    Check,
    /// A value with a maximum (`value`) and a current value.
    NumberResource,
    /// A status line.
    Status,
    /// Multi-line free text.
    Note,
    /// An image reference.
    Image,
    /// A die-shaped value.
    Polygonal,
    /// A consumable counter.
    Expendable,
    /// A plain number.
    SimpleNumber,
}

impl DataElementType {
    /// The attribute text for this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::NumberResource => "numberResource",
            Self::Status => "status",
            Self::Note => "note",
            Self::Image => "image",
            Self::Polygonal => "polygonal",
            Self::Expendable => "expendable",
            Self::SimpleNumber => "simpleNumber",
        }
    }

    /// Parses attribute text; unknown types yield `None`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "check" => Some(Self::Check),
            "numberResource" => Some(Self::NumberResource),
            "status" => Some(Self::Status),
            "note" => Some(Self::Note),
            "image" => Some(Self::Image),
            "polygonal" => Some(Self::Polygonal),
            "expendable" => Some(Self::Expendable),
            "simpleNumber" => Some(Self::SimpleNumber),
            _ => None,
        }
    }
}

impl fmt::Display for DataElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attributed tree entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataElement {
    /// Element name, used for lookups among siblings.
    pub name: String,
    /// Element value.
    pub value: DataValue,
    /// Free-form attributes, including `type` and `currentValue`.
    pub attributes: BTreeMap<String, String>,
}

impl DataElement {
    /// Creates an unregistered, unattached data element node.
    ///
    /// This is the only way data elements come into existence; attach the
    /// result with `ObjectStore::insert_tree` or wrap it in a `NodeTree`.
    #[must_use]
    pub fn create<K: NodeKind>(
        name: impl Into<String>,
        value: impl Into<DataValue>,
        attributes: &[(&str, &str)],
        identifier: Option<Identifier>,
    ) -> Node<K> {
        let element = DataElement {
            name: name.into(),
            value: value.into(),
            attributes: attributes
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        };
        let kind = K::from_data_element(element);
        match identifier {
            Some(identifier) => Node::with_identifier(identifier, kind),
            None => Node::new(kind),
        }
    }

    /// The raw `type` attribute, empty if unset.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        self.attributes.get(TYPE_ATTRIBUTE).map_or("", String::as_str)
    }

    /// The parsed `type` attribute.
    #[must_use]
    pub fn element_type(&self) -> Option<DataElementType> {
        DataElementType::parse(self.type_tag())
    }

    /// Sets the `type` attribute.
    pub fn set_element_type(&mut self, element_type: DataElementType) {
        self.attributes
            .insert(TYPE_ATTRIBUTE.to_owned(), element_type.as_str().to_owned());
    }

    /// The `currentValue` attribute, parsed like an XML value.
    #[must_use]
    pub fn current_value(&self) -> DataValue {
        self.attributes
            .get(CURRENT_VALUE_ATTRIBUTE)
            .map_or(DataValue::Empty, |text| DataValue::from_text(text))
    }

    /// Sets the `currentValue` attribute.
    pub fn set_current_value(&mut self, value: &DataValue) {
        self.attributes
            .insert(CURRENT_VALUE_ATTRIBUTE.to_owned(), value.to_text());
    }

    /// Sets the value from element text read out of XML.
    ///
    /// The text stays verbatim unless the element was marked with
    /// `valueType="number"`; a marked element whose text does not parse
    /// keeps it as text.
    pub fn apply_xml_text(&mut self, text: &str) {
        let marked_number = matches!(self.value, DataValue::Number(_));
        self.value = match text.trim().parse::<f64>() {
            Ok(number) if marked_number && number.is_finite() => DataValue::Number(number),
            _ => {
                if marked_number {
                    warn!(name = %self.name, text, "number element with non-numeric text");
                }
                DataValue::text(text)
            }
        };
    }

    /// True if a `check` element is switched on.
    #[must_use]
    pub fn is_checked(&self) -> bool {
        !self.value.is_empty()
    }

    /// The value a placeholder referring to this element resolves to:
    /// the current value for resources, the value otherwise.
    #[must_use]
    pub fn effective_value(&self) -> DataValue {
        match self.element_type() {
            Some(DataElementType::NumberResource) => self.current_value(),
            _ => self.value.clone(),
        }
    }
}

impl SyncSchema for DataElement {
    const FIELD_NAMES: &'static [&'static str] = &["name", "value", "attributes"];

    fn write_sync_map(&self, map: &mut SyncMap) {
        map.insert("name".to_owned(), encode_field(&self.name));
        map.insert("value".to_owned(), encode_field(&self.value));
        map.insert("attributes".to_owned(), encode_field(&self.attributes));
    }

    fn read_sync_map(&mut self, map: &SyncMap, report: &mut ApplyReport) {
        decode_field(map, "name", &mut self.name, report);
        decode_field(map, "value", &mut self.value, report);
        decode_field(map, "attributes", &mut self.attributes, report);
    }

    fn write_text_fields(&self, out: &mut Vec<(String, String)>) {
        out.push(("name".to_owned(), self.name.clone()));
        if matches!(self.value, DataValue::Number(_)) {
            out.push((VALUE_TYPE_ATTRIBUTE.to_owned(), NUMBER_VALUE_TYPE.to_owned()));
        }
        for (key, value) in &self.attributes {
            if key != VALUE_TYPE_ATTRIBUTE {
                out.push((key.clone(), value.clone()));
            }
        }
    }

    fn read_text_field(&mut self, name: &str, text: &str) -> Option<bool> {
        match name {
            "name" => self.name = text.to_owned(),
            // The element text arrives after the attributes and replaces
            // this placeholder in `apply_xml_text`.
            VALUE_TYPE_ATTRIBUTE if text == NUMBER_VALUE_TYPE => self.value = DataValue::Number(0.0),
            VALUE_TYPE_ATTRIBUTE => warn!(value_type = text, "unknown value type treated as text"),
            _ => {
                self.attributes.insert(name.to_owned(), text.to_owned());
            }
        }
        Some(true)
    }
}

/// Data element queries over a store.
impl<K: NodeKind> ObjectStore<K> {
    /// The data element stored under `identifier`, if it is one.
    #[must_use]
    pub fn element(&self, identifier: &Identifier) -> Option<&DataElement> {
        self.get(identifier)?.kind().as_data_element()
    }

    /// Mutable access to a data element. Call `update` afterwards.
    pub fn element_mut(&mut self, identifier: &Identifier) -> Option<&mut DataElement> {
        self.get_mut(identifier)?.kind_mut().as_data_element_mut()
    }

    /// First direct child of `parent` that is a data element named `name`.
    #[must_use]
    pub fn first_element_by_name(&self, parent: &Identifier, name: &str) -> Option<Identifier> {
        self.get(parent)?
            .children()
            .iter()
            .find(|child| self.element(child).is_some_and(|e| e.name == name))
            .cloned()
    }

    /// Every data element below `root` (not `root` itself) whose `type`
    /// attribute equals `type_tag`, in pre-order.
    #[must_use]
    pub fn elements_by_type(&self, root: &Identifier, type_tag: &str) -> Vec<Identifier> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.element(id).is_some_and(|e| e.type_tag() == type_tag))
            .collect()
    }

    /// First data element below `root`, in pre-order, accepted by `matches`.
    #[must_use]
    pub fn find_element(
        &self,
        root: &Identifier,
        matches: impl Fn(&DataElement) -> bool,
    ) -> Option<Identifier> {
        self.descendants(root)
            .into_iter()
            .find(|id| self.element(id).is_some_and(&matches))
    }
}
