//! Playing-piece characters.

use std::ops::{Deref, DerefMut};

use tablemesh_core::config::DEFAULT_PLACEHOLDER_ITERATION_LIMIT;
use tablemesh_core::error::SyncError;
use tablemesh_core::identifier::Identifier;
use tablemesh_core::value::DataValue;
use tablemesh_object::data_element::{DataElement, DataElementType};
use tablemesh_object::kind::NodeKind;
use tablemesh_object::node::{Node, NodeTree};

use crate::chat_palette::{CHAT_PALETTE_ALIAS, ChatPalette, PlaceholderSource};
use crate::fields::CharacterFields;
use crate::kind::{CHARACTER_ALIAS, TabletopKind, TabletopStore};
use crate::object::{
    COMMON_SECTION, DETAIL_SECTION, IMAGE_IDENTIFIER_ELEMENT, IMAGE_SECTION, NAME_ELEMENT,
    TabletopObject, data_element, object_tree, section,
};

/// Element holding a character's footprint in grid squares.
pub const SIZE_ELEMENT: &str = "size";
/// Check element set when the piece is drawn mirrored.
pub const INVERT_ELEMENT: &str = "invert";
/// Check element set when the piece lies flat.
pub const PRONE_ELEMENT: &str = "prone";

const DEFAULT_SIZE: f64 = 1.0;

/// Builds an unregistered character with its sections seeded and an empty
/// chat palette attached.
#[must_use]
pub fn create_character(name: &str, size: f64, image_identifier: &str) -> NodeTree<TabletopKind> {
    let resource = |name: &str, max: f64| {
        let mut node = data_element(name, max, Some(DataElementType::NumberResource));
        if let Some(element) = node.kind_mut().as_data_element_mut() {
            element.set_current_value(&DataValue::Number(max));
        }
        node
    };
    object_tree(
        TabletopKind::Character(CharacterFields::default()),
        section(IMAGE_SECTION).with_child(data_element(
            IMAGE_IDENTIFIER_ELEMENT,
            DataValue::text(image_identifier),
            Some(DataElementType::Image),
        )),
        section(COMMON_SECTION)
            .with_child(data_element(NAME_ELEMENT, DataValue::text(name), None))
            .with_child(data_element(SIZE_ELEMENT, size, None)),
        section(DETAIL_SECTION)
            .with_child(
                section("Resources")
                    .with_child(resource("HP", 200.0))
                    .with_child(resource("MP", 100.0)),
            )
            .with_child(section("Info").with_child(data_element(
                "Notes",
                DataValue::Empty,
                Some(DataElementType::Note),
            ))),
    )
    .with_child(Node::new(TabletopKind::ChatPalette(ChatPalette::default())))
}

/// Read/write access to a character.
#[derive(Debug)]
pub struct GameCharacter<'a> {
    object: TabletopObject<'a>,
}

impl<'a> Deref for GameCharacter<'a> {
    type Target = TabletopObject<'a>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl DerefMut for GameCharacter<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}

impl<'a> GameCharacter<'a> {
    /// Opens a live character.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the
    /// identifier is not live and `SyncError::KindMismatch` if the node is
    /// not a character.
    pub fn open(store: &'a mut TabletopStore, identifier: &Identifier) -> Result<Self, SyncError> {
        Ok(Self {
            object: TabletopObject::open_alias(store, identifier, CHARACTER_ALIAS)?,
        })
    }

    fn fields(&self) -> CharacterFields {
        match self.kind() {
            Some(TabletopKind::Character(fields)) => fields.clone(),
            _ => CharacterFields::default(),
        }
    }

    /// Footprint in grid squares (`common/size`).
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn size(&mut self) -> Result<f64, SyncError> {
        self.number(COMMON_SECTION, SIZE_ELEMENT, DEFAULT_SIZE)
    }

    /// Sets the footprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn set_size(&mut self, size: f64) -> Result<(), SyncError> {
        self.set_value(COMMON_SECTION, SIZE_ELEMENT, DataValue::Number(size))
    }

    /// True if the piece is drawn mirrored (`common/invert`).
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn is_invert(&mut self) -> Result<bool, SyncError> {
        self.flag(COMMON_SECTION, INVERT_ELEMENT)
    }

    /// Mirrors or un-mirrors the piece.
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn set_invert(&mut self, invert: bool) -> Result<(), SyncError> {
        self.set_flag(COMMON_SECTION, INVERT_ELEMENT, invert)
    }

    /// True if the piece lies flat (`common/prone`).
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn is_prone(&mut self) -> Result<bool, SyncError> {
        self.flag(COMMON_SECTION, PRONE_ELEMENT)
    }

    /// Lays the piece flat or stands it up.
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn set_prone(&mut self, prone: bool) -> Result<(), SyncError> {
        self.set_flag(COMMON_SECTION, PRONE_ELEMENT, prone)
    }

    /// Rotation in degrees.
    #[must_use]
    pub fn rotate(&self) -> f64 {
        self.fields().rotate
    }

    /// Number of facing directions.
    #[must_use]
    pub fn direction_count(&self) -> u32 {
        self.fields().direction_count
    }

    /// Rotates the piece.
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn set_rotate(&mut self, degrees: f64) -> Result<(), SyncError> {
        self.modify(|kind| {
            if let TabletopKind::Character(fields) = kind {
                fields.rotate = degrees;
            }
        })
    }

    /// The attached chat palette, created if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn chat_palette(&mut self) -> Result<Identifier, SyncError> {
        let id = self.identifier().clone();
        let existing = self
            .store()
            .children_of(&id)
            .into_iter()
            .find(|node| node.alias_name() == CHAT_PALETTE_ALIAS)
            .map(|node| node.identifier().clone());
        if let Some(existing) = existing {
            return Ok(existing);
        }
        let palette = Node::new(TabletopKind::ChatPalette(ChatPalette::default()));
        self.store_mut().insert_tree(NodeTree::new(palette), Some(&id))
    }

    /// Replaces the chat palette text.
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn set_palette(&mut self, text: &str) -> Result<(), SyncError> {
        let id = self.chat_palette()?;
        let store = self.store_mut();
        if let Some(TabletopKind::ChatPalette(palette)) = store.get_mut(&id).map(Node::kind_mut) {
            palette.set_text(text);
        }
        store.update(&id)
    }

    /// The chat palette's lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn palette_lines(&mut self) -> Result<Vec<String>, SyncError> {
        let id = self.chat_palette()?;
        Ok(match self.store().get(&id).map(Node::kind) {
            Some(TabletopKind::ChatPalette(palette)) => palette.lines().to_vec(),
            _ => Vec::new(),
        })
    }

    /// Evaluates `line` against the chat palette and then the character's
    /// data elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn evaluate_palette(&mut self, line: &str) -> Result<String, SyncError> {
        self.evaluate_palette_with_limit(line, DEFAULT_PLACEHOLDER_ITERATION_LIMIT)
    }

    /// Like [`evaluate_palette`](Self::evaluate_palette) with an explicit
    /// pass limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the character is no longer live.
    pub fn evaluate_palette_with_limit(&mut self, line: &str, limit: usize) -> Result<String, SyncError> {
        let palette_id = self.chat_palette()?;
        let store = self.store();
        let data = CharacterData::new(store, self.identifier());
        Ok(match store.get(&palette_id).map(Node::kind) {
            Some(TabletopKind::ChatPalette(palette)) => palette.evaluate(line, Some(&data), limit),
            _ => line.to_owned(),
        })
    }
}

/// Placeholder lookup over a character's data elements.
///
/// Names match ignoring case and whitespace; resources resolve to their
/// current value.
#[derive(Debug)]
pub struct CharacterData<'s> {
    store: &'s TabletopStore,
    root: Identifier,
}

impl<'s> CharacterData<'s> {
    /// Looks up placeholders in the data below `root`.
    #[must_use]
    pub fn new(store: &'s TabletopStore, root: &Identifier) -> Self {
        Self {
            store,
            root: root.clone(),
        }
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

impl PlaceholderSource for CharacterData<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        let wanted = normalize(name);
        if wanted.is_empty() {
            return None;
        }
        // Sections and empty elements never resolve, so the placeholder
        // is left in the text.
        self.store
            .descendants(&self.root)
            .iter()
            .filter(|id| self.store.get(id).is_some_and(|node| node.children().is_empty()))
            .filter_map(|id| self.store.element(id))
            .filter(|element| normalize(&element.name) == wanted)
            .map(DataElement::effective_value)
            .find(|value| !value.is_empty())
            .map(|value| value.to_text())
    }
}

#[cfg(test)]
mod tests {
    use tablemesh_object::data_element::TYPE_ATTRIBUTE;

    use super::*;

    fn bob(store: &mut TabletopStore) -> Identifier {
        store.insert_tree(create_character("Bob", 1.0, "img-bob"), None).unwrap()
    }

    #[test]
    fn test_palette_scenario_substitutes_variable() {
        // Arrange
        let mut store = TabletopStore::new();
        let id = bob(&mut store);
        let mut character = GameCharacter::open(&mut store, &id).unwrap();

        // Act
        character.set_palette("2d6+{str}\n//str=5").unwrap();
        let result = character.evaluate_palette("2d6+{str}").unwrap();

        // Assert
        assert_eq!(character.name().unwrap(), "Bob");
        assert!((character.size().unwrap() - 1.0).abs() < f64::EPSILON);
        assert_eq!(result, "2d6+5");
        assert_eq!(character.palette_lines().unwrap(), vec!["2d6+{str}".to_owned()]);
    }

    #[test]
    fn test_reading_invert_heals_missing_check_element() {
        // Arrange
        let mut store = TabletopStore::new();
        let id = bob(&mut store);
        let mut character = GameCharacter::open(&mut store, &id).unwrap();
        let common = character.section(COMMON_SECTION).unwrap();
        let before = character.store().first_element_by_name(&common, INVERT_ELEMENT);

        // Act
        let invert = character.is_invert().unwrap();

        // Assert
        assert!(before.is_none());
        assert!(!invert);
        let healed = store.first_element_by_name(&common, INVERT_ELEMENT).unwrap();
        let element = store.element(&healed).unwrap();
        assert_eq!(element.attributes.get(TYPE_ATTRIBUTE).map(String::as_str), Some("check"));
        assert!(element.value.is_empty());
    }

    #[test]
    fn test_placeholders_fall_back_to_character_data() {
        let mut store = TabletopStore::new();
        let id = bob(&mut store);
        let mut character = GameCharacter::open(&mut store, &id).unwrap();
        character.set_palette("//dmg=1d6").unwrap();

        let result = character.evaluate_palette("{dmg}+{ h p }/{Name}/{unknown}").unwrap();

        assert_eq!(result, "1d6+200/Bob/{unknown}");
    }

    #[test]
    fn test_sections_and_empty_elements_leave_placeholders_verbatim() {
        // Arrange
        let mut store = TabletopStore::new();
        let id = bob(&mut store);
        let mut character = GameCharacter::open(&mut store, &id).unwrap();

        // Act
        let result = character
            .evaluate_palette("{detail}/{Resources}/{common}/{Notes}/{MP}")
            .unwrap();

        // Assert
        assert_eq!(result, "{detail}/{Resources}/{common}/{Notes}/100");
    }

    #[test]
    fn test_missing_palette_is_recreated() {
        // Arrange
        let mut store = TabletopStore::new();
        let id = bob(&mut store);
        let original = GameCharacter::open(&mut store, &id).unwrap().chat_palette().unwrap();
        store.destroy(&original).unwrap();

        // Act
        let replacement = GameCharacter::open(&mut store, &id).unwrap().chat_palette().unwrap();

        // Assert
        assert_ne!(original, replacement);
        assert_eq!(store.get(&replacement).unwrap().parent(), Some(&id));
    }

    #[test]
    fn test_open_rejects_other_kinds() {
        let mut store = TabletopStore::new();
        let piece = store
            .insert_tree(crate::piece::create_piece("Pawn", ""), None)
            .unwrap();

        let result = GameCharacter::open(&mut store, &piece).map(|_| ());

        assert!(matches!(
            result,
            Err(SyncError::KindMismatch { expected: CHARACTER_ALIAS, .. })
        ));
    }

    #[test]
    fn test_rotate_is_a_synchronized_field() {
        let mut store = TabletopStore::new();
        let id = bob(&mut store);
        let mut character = GameCharacter::open(&mut store, &id).unwrap();

        character.set_rotate(90.0).unwrap();

        assert!((character.rotate() - 90.0).abs() < f64::EPSILON);
        assert_eq!(character.direction_count(), 1);
        assert_eq!(
            store.get(&id).unwrap().kind().sync_fields()["rotate"],
            serde_json::json!(90.0)
        );
    }
}
