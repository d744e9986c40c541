//! Shared behaviour of objects with `image`/`common`/`detail` sections.
//!
//! Readers never fail on a missing section or element: they create it with
//! a default value, attach it where it belongs, and return the default.
//! The created element is recorded like any other change and replicates on
//! the next flush.

use tablemesh_core::error::SyncError;
use tablemesh_core::identifier::Identifier;
use tablemesh_core::value::DataValue;
use tablemesh_object::data_element::{DataElement, DataElementType, TYPE_ATTRIBUTE};
use tablemesh_object::node::{Lifecycle, Node, NodeTree};
use tracing::debug;

use crate::fields::Location;
use crate::kind::{TabletopKind, TabletopStore};

/// Section holding image references.
pub const IMAGE_SECTION: &str = "image";
/// Section holding position-independent shared attributes.
pub const COMMON_SECTION: &str = "common";
/// Section holding free-form resources, statuses and notes.
pub const DETAIL_SECTION: &str = "detail";

/// Element holding an object's display name.
pub const NAME_ELEMENT: &str = "name";
/// Element holding an object's main image.
pub const IMAGE_IDENTIFIER_ELEMENT: &str = "imageIdentifier";

/// Alias used in errors when any tabletop object would do.
const ANY_TABLETOP_OBJECT: &str = "tabletop object";

/// Creates an unattached data element node for a tabletop store.
#[must_use]
pub fn data_element(
    name: &str,
    value: impl Into<DataValue>,
    element_type: Option<DataElementType>,
) -> Node<TabletopKind> {
    match element_type {
        Some(element_type) => DataElement::create::<TabletopKind>(
            name,
            value,
            &[(TYPE_ATTRIBUTE, element_type.as_str())],
            None,
        ),
        None => DataElement::create::<TabletopKind>(name, value, &[], None),
    }
}

/// An empty section element.
#[must_use]
pub fn section(name: &str) -> NodeTree<TabletopKind> {
    NodeTree::new(data_element(name, DataValue::Empty, None))
}

/// Assembles an object tree from its kind and three sections.
#[must_use]
pub fn object_tree(
    kind: TabletopKind,
    image: NodeTree<TabletopKind>,
    common: NodeTree<TabletopKind>,
    detail: NodeTree<TabletopKind>,
) -> NodeTree<TabletopKind> {
    NodeTree::new(Node::new(kind))
        .with_child(image)
        .with_child(common)
        .with_child(detail)
}

pub(crate) fn require_kind(
    store: &TabletopStore,
    identifier: &Identifier,
    expected: &'static str,
    accepts: impl Fn(&TabletopKind) -> bool,
) -> Result<(), SyncError> {
    match store.get(identifier) {
        Some(node) if accepts(node.kind()) => Ok(()),
        Some(node) => Err(SyncError::KindMismatch {
            identifier: identifier.clone(),
            expected,
            actual: node.alias_name().to_owned(),
        }),
        None if store.lifecycle(identifier) == Lifecycle::Destroyed => {
            Err(SyncError::ObjectDestroyed(identifier.clone()))
        }
        None => Err(SyncError::ObjectNotFound(identifier.clone())),
    }
}

/// Read/write access to one tabletop object through its store.
#[derive(Debug)]
pub struct TabletopObject<'a> {
    store: &'a mut TabletopStore,
    identifier: Identifier,
}

impl<'a> TabletopObject<'a> {
    /// Opens any live tabletop object.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the
    /// identifier is not live and `SyncError::KindMismatch` if the node is
    /// not a tabletop object.
    pub fn open(store: &'a mut TabletopStore, identifier: &Identifier) -> Result<Self, SyncError> {
        require_kind(store, identifier, ANY_TABLETOP_OBJECT, TabletopKind::is_tabletop_object)?;
        Ok(Self {
            store,
            identifier: identifier.clone(),
        })
    }

    /// Opens a live object of the kind registered under `alias`.
    pub(crate) fn open_alias(
        store: &'a mut TabletopStore,
        identifier: &Identifier,
        alias: &'static str,
    ) -> Result<Self, SyncError> {
        require_kind(store, identifier, alias, |kind| {
            tablemesh_object::kind::NodeKind::alias_name(kind) == alias
        })?;
        Ok(Self {
            store,
            identifier: identifier.clone(),
        })
    }

    /// The object's identifier.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &TabletopStore {
        &*self.store
    }

    /// The underlying store, mutably.
    pub fn store_mut(&mut self) -> &mut TabletopStore {
        &mut *self.store
    }

    /// The object's kind, if it is still live.
    #[must_use]
    pub fn kind(&self) -> Option<&TabletopKind> {
        self.store.get(&self.identifier).map(|node| node.kind())
    }

    /// Mutates the object's kind and records an update.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the object
    /// is no longer live.
    pub fn modify(&mut self, change: impl FnOnce(&mut TabletopKind)) -> Result<(), SyncError> {
        let node = self
            .store
            .get_mut(&self.identifier)
            .ok_or_else(|| SyncError::ObjectNotFound(self.identifier.clone()))?;
        change(node.kind_mut());
        self.store.update(&self.identifier)
    }

    /// Records an update of the object without changing anything.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the object
    /// is no longer live.
    pub fn update(&mut self) -> Result<(), SyncError> {
        self.store.update(&self.identifier)
    }

    /// Where the object sits.
    #[must_use]
    pub fn location(&self) -> Location {
        self.kind()
            .and_then(TabletopKind::placed)
            .map(|placed| placed.location())
            .unwrap_or_default()
    }

    /// Moves the object.
    ///
    /// # Errors
    ///
    /// See [`modify`](Self::modify).
    pub fn set_location(&mut self, location: &Location) -> Result<(), SyncError> {
        self.modify(|kind| {
            if let Some(placed) = kind.placed_mut() {
                placed.set_location(location);
            }
        })
    }

    /// Stacking order.
    #[must_use]
    pub fn z_index(&self) -> i64 {
        self.kind()
            .and_then(TabletopKind::placed)
            .map_or(0, |placed| placed.z_index())
    }

    /// Ensures the `image`, `common` and `detail` sections exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn create_data_elements(&mut self) -> Result<(), SyncError> {
        for name in [IMAGE_SECTION, COMMON_SECTION, DETAIL_SECTION] {
            self.section(name)?;
        }
        Ok(())
    }

    /// The section element called `name`, created if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn section(&mut self, name: &str) -> Result<Identifier, SyncError> {
        let root = self.identifier.clone();
        self.child_element(&root, name, None, DataValue::Empty)
    }

    /// The element `name` directly under `parent`, created with
    /// `element_type` and `default` if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` is not live.
    pub fn child_element(
        &mut self,
        parent: &Identifier,
        name: &str,
        element_type: Option<DataElementType>,
        default: DataValue,
    ) -> Result<Identifier, SyncError> {
        if let Some(existing) = self.store.first_element_by_name(parent, name) {
            return Ok(existing);
        }
        debug!(object = %self.identifier, element = name, "creating missing element");
        self.store
            .insert_tree(NodeTree::new(data_element(name, default, element_type)), Some(parent))
    }

    /// The element `name` in `section`, created if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn element_in(
        &mut self,
        section: &str,
        name: &str,
        element_type: Option<DataElementType>,
        default: DataValue,
    ) -> Result<Identifier, SyncError> {
        let section = self.section(section)?;
        self.child_element(&section, name, element_type, default)
    }

    /// Value of `section/name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn value(&mut self, section: &str, name: &str) -> Result<DataValue, SyncError> {
        let id = self.element_in(section, name, None, DataValue::Empty)?;
        Ok(self.element_value(&id))
    }

    /// Numeric value of `section/name`; a missing element is created with
    /// `default`, and a non-numeric value reads as `default`.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn number(&mut self, section: &str, name: &str, default: f64) -> Result<f64, SyncError> {
        let id = self.element_in(section, name, None, DataValue::Number(default))?;
        Ok(self.element_value(&id).as_number().unwrap_or(default))
    }

    /// Overwrites `section/name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn set_value(&mut self, section: &str, name: &str, value: DataValue) -> Result<(), SyncError> {
        let id = self.element_in(section, name, None, DataValue::Empty)?;
        self.write_element(&id, value)
    }

    /// A `check` element in `section`; missing ones are created switched off.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn flag(&mut self, section: &str, name: &str) -> Result<bool, SyncError> {
        let id = self.element_in(section, name, Some(DataElementType::Check), DataValue::Empty)?;
        Ok(self.store.element(&id).is_some_and(DataElement::is_checked))
    }

    /// Switches a `check` element on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn set_flag(&mut self, section: &str, name: &str, on: bool) -> Result<(), SyncError> {
        let id = self.element_in(section, name, Some(DataElementType::Check), DataValue::Empty)?;
        let value = if on { DataValue::text(name) } else { DataValue::Empty };
        self.write_element(&id, value)
    }

    /// Display name (`common/name`).
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn name(&mut self) -> Result<String, SyncError> {
        Ok(self.value(COMMON_SECTION, NAME_ELEMENT)?.to_text())
    }

    /// Sets the display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn set_name(&mut self, name: &str) -> Result<(), SyncError> {
        self.set_value(COMMON_SECTION, NAME_ELEMENT, DataValue::text(name))
    }

    /// Main image (`image/imageIdentifier`).
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn image_identifier(&mut self) -> Result<String, SyncError> {
        let id = self.element_in(
            IMAGE_SECTION,
            IMAGE_IDENTIFIER_ELEMENT,
            Some(DataElementType::Image),
            DataValue::Empty,
        )?;
        Ok(self.element_value(&id).to_text())
    }

    /// Replaces the main image.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is no longer live.
    pub fn set_image_identifier(&mut self, image: &str) -> Result<(), SyncError> {
        let id = self.element_in(
            IMAGE_SECTION,
            IMAGE_IDENTIFIER_ELEMENT,
            Some(DataElementType::Image),
            DataValue::Empty,
        )?;
        self.write_element(&id, DataValue::text(image))
    }

    pub(crate) fn element_value(&self, id: &Identifier) -> DataValue {
        self.store
            .element(id)
            .map(|element| element.value.clone())
            .unwrap_or_default()
    }

    pub(crate) fn write_element(&mut self, id: &Identifier, value: DataValue) -> Result<(), SyncError> {
        let element = self
            .store
            .element_mut(id)
            .ok_or_else(|| SyncError::ObjectNotFound(id.clone()))?;
        if element.value == value {
            return Ok(());
        }
        element.value = value;
        self.store.update(id)
    }
}

#[cfg(test)]
mod tests {
    use tablemesh_object::kind::NodeKind;
    use tablemesh_object::store::ObjectChange;

    use super::*;
    use crate::fields::PieceFields;
    use crate::piece::create_piece;

    #[test]
    fn test_open_rejects_non_objects_and_unknown_identifiers() {
        // Arrange
        let mut store = TabletopStore::new();
        let element = store
            .register(data_element("loose", DataValue::Empty, None))
            .unwrap();
        let unknown = Identifier::from("unknown");

        // Act
        let on_element = TabletopObject::open(&mut store, &element).map(|_| ());
        let on_unknown = TabletopObject::open(&mut store, &unknown).map(|_| ());

        // Assert
        assert!(matches!(on_element, Err(SyncError::KindMismatch { .. })));
        assert_eq!(on_unknown, Err(SyncError::ObjectNotFound(unknown)));
    }

    #[test]
    fn test_missing_sections_are_created_once() {
        // Arrange
        let mut store = TabletopStore::new();
        let id = store
            .register(Node::new(TabletopKind::Piece(PieceFields::default())))
            .unwrap();
        let mut object = TabletopObject::open(&mut store, &id).unwrap();

        // Act
        object.create_data_elements().unwrap();
        object.create_data_elements().unwrap();

        // Assert
        let children = store.children_of(&id);
        let names: Vec<&str> = children
            .iter()
            .filter_map(|node| node.kind().as_data_element())
            .map(|element| element.name.as_str())
            .collect();
        assert_eq!(names, vec![IMAGE_SECTION, COMMON_SECTION, DETAIL_SECTION]);
    }

    #[test]
    fn test_reading_missing_value_heals_it_with_default() {
        let mut store = TabletopStore::new();
        let id = store.insert_tree(create_piece("Pawn", "img"), None).unwrap();
        let mut object = TabletopObject::open(&mut store, &id).unwrap();

        let altitude = object.number(COMMON_SECTION, "altitude", 0.0).unwrap();
        let common = object.section(COMMON_SECTION).unwrap();

        assert!(altitude.abs() < f64::EPSILON);
        assert!(store.first_element_by_name(&common, "altitude").is_some());
    }

    #[test]
    fn test_set_location_records_update() {
        // Arrange
        let mut store = TabletopStore::new();
        let id = store.insert_tree(create_piece("Pawn", "img"), None).unwrap();
        store.take_changes();
        let mut object = TabletopObject::open(&mut store, &id).unwrap();

        // Act
        object
            .set_location(&Location {
                name: "table".to_owned(),
                x: 3.0,
                y: 4.0,
            })
            .unwrap();

        // Assert
        assert!((object.location().x - 3.0).abs() < f64::EPSILON);
        assert_eq!(store.take_changes(), vec![ObjectChange::Updated(id)]);
    }

    #[test]
    fn test_unchanged_value_write_records_nothing() {
        let mut store = TabletopStore::new();
        let id = store.insert_tree(create_piece("Pawn", "img"), None).unwrap();
        store.take_changes();
        let mut object = TabletopObject::open(&mut store, &id).unwrap();

        object.set_name("Pawn").unwrap();

        assert!(!store.has_pending_changes());
    }

    #[test]
    fn test_flag_toggles_check_element() {
        let mut store = TabletopStore::new();
        let id = store.insert_tree(create_piece("Pawn", "img"), None).unwrap();
        let mut object = TabletopObject::open(&mut store, &id).unwrap();

        assert!(!object.flag(COMMON_SECTION, "hidden").unwrap());
        object.set_flag(COMMON_SECTION, "hidden", true).unwrap();
        assert!(object.flag(COMMON_SECTION, "hidden").unwrap());
        object.set_flag(COMMON_SECTION, "hidden", false).unwrap();
        assert!(!object.flag(COMMON_SECTION, "hidden").unwrap());
    }
}
