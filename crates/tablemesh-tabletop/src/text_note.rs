//! Free-form text notes.

use std::ops::{Deref, DerefMut};

use tablemesh_core::error::SyncError;
use tablemesh_core::identifier::Identifier;
use tablemesh_core::value::DataValue;
use tablemesh_object::data_element::DataElementType;
use tablemesh_object::node::NodeTree;
use tracing::debug;

use crate::fields::TextNoteFields;
use crate::image::{ImageUrlResolver, rewrite_markdown_images};
use crate::kind::{TEXT_NOTE_ALIAS, TabletopKind, TabletopStore};
use crate::object::{
    COMMON_SECTION, DETAIL_SECTION, IMAGE_SECTION, TabletopObject, data_element, object_tree,
    section,
};

/// Element holding the note's heading.
pub const TITLE_ELEMENT: &str = "title";
/// Element holding the note's body.
pub const TEXT_ELEMENT: &str = "text";

/// Font size used when `common/fontsize` is missing.
pub const DEFAULT_FONT_SIZE: f64 = 14.0;
/// Width in grid squares used when `common/width` is missing.
pub const DEFAULT_NOTE_WIDTH: f64 = 4.0;
/// Height in grid squares used when `common/height` is missing.
pub const DEFAULT_NOTE_HEIGHT: f64 = 3.0;

/// Builds an unregistered text note with its sections seeded.
#[must_use]
pub fn create_text_note(
    title: &str,
    text: &str,
    font_size: f64,
    width: f64,
    height: f64,
) -> NodeTree<TabletopKind> {
    object_tree(
        TabletopKind::TextNote(TextNoteFields::default()),
        section(IMAGE_SECTION),
        section(COMMON_SECTION)
            .with_child(data_element(TITLE_ELEMENT, DataValue::text(title), None))
            .with_child(data_element("width", width, None))
            .with_child(data_element("height", height, None))
            .with_child(data_element("fontsize", font_size, None)),
        section(DETAIL_SECTION).with_child(data_element(
            TEXT_ELEMENT,
            DataValue::text(text),
            Some(DataElementType::Note),
        )),
    )
}

/// Read/write access to a text note.
#[derive(Debug)]
pub struct TextNote<'a> {
    object: TabletopObject<'a>,
}

impl<'a> Deref for TextNote<'a> {
    type Target = TabletopObject<'a>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl DerefMut for TextNote<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}

impl<'a> TextNote<'a> {
    /// Opens a live text note.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the
    /// identifier is not live and `SyncError::KindMismatch` if the node is
    /// not a text note.
    pub fn open(store: &'a mut TabletopStore, identifier: &Identifier) -> Result<Self, SyncError> {
        Ok(Self {
            object: TabletopObject::open_alias(store, identifier, TEXT_NOTE_ALIAS)?,
        })
    }

    /// The note's heading.
    ///
    /// # Errors
    ///
    /// Returns an error if the note is no longer live.
    pub fn title(&mut self) -> Result<String, SyncError> {
        Ok(self.value(COMMON_SECTION, TITLE_ELEMENT)?.to_text())
    }

    /// Replaces the heading.
    ///
    /// # Errors
    ///
    /// Returns an error if the note is no longer live.
    pub fn set_title(&mut self, title: &str) -> Result<(), SyncError> {
        self.set_value(COMMON_SECTION, TITLE_ELEMENT, DataValue::text(title))
    }

    fn text_element(&mut self) -> Result<Identifier, SyncError> {
        self.element_in(
            DETAIL_SECTION,
            TEXT_ELEMENT,
            Some(DataElementType::Note),
            DataValue::Empty,
        )
    }

    /// The note's markdown body.
    ///
    /// # Errors
    ///
    /// Returns an error if the note is no longer live.
    pub fn text(&mut self) -> Result<String, SyncError> {
        let id = self.text_element()?;
        Ok(self.element_value(&id).to_text())
    }

    /// Replaces the body, resolving inline image destinations that name a
    /// known image to its URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the note is no longer live.
    pub fn set_text(&mut self, text: &str, images: &dyn ImageUrlResolver) -> Result<(), SyncError> {
        let rewritten = rewrite_markdown_images(text, images);
        let id = self.text_element()?;
        self.write_element(&id, DataValue::text(rewritten))
    }

    /// Font size in points.
    ///
    /// # Errors
    ///
    /// Returns an error if the note is no longer live.
    pub fn font_size(&mut self) -> Result<f64, SyncError> {
        self.number(COMMON_SECTION, "fontsize", DEFAULT_FONT_SIZE)
    }

    /// Width in grid squares.
    ///
    /// # Errors
    ///
    /// Returns an error if the note is no longer live.
    pub fn width(&mut self) -> Result<f64, SyncError> {
        self.number(COMMON_SECTION, "width", DEFAULT_NOTE_WIDTH)
    }

    /// Height in grid squares.
    ///
    /// # Errors
    ///
    /// Returns an error if the note is no longer live.
    pub fn height(&mut self) -> Result<f64, SyncError> {
        self.number(COMMON_SECTION, "height", DEFAULT_NOTE_HEIGHT)
    }

    /// Brings the note in front of every other note on its surface.
    ///
    /// The other notes keep their relative order and are packed into
    /// `0..n`; this note takes `n`. Only notes whose `zindex` actually
    /// changes are updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the note is no longer live.
    pub fn to_topmost(&mut self) -> Result<(), SyncError> {
        let surface = self.location().name;
        let own = self.identifier().clone();
        let mut others: Vec<(Identifier, i64)> = self
            .store()
            .get_objects(TEXT_NOTE_ALIAS)
            .into_iter()
            .filter(|node| node.identifier() != &own)
            .filter_map(|node| {
                let placed = node.kind().placed()?;
                (placed.location().name == surface)
                    .then(|| (node.identifier().clone(), placed.z_index()))
            })
            .collect();
        others.sort_by_key(|(_, z)| *z);

        let top = i64::try_from(others.len()).unwrap_or(i64::MAX);
        debug!(note = %own, surface = %surface, z_index = top, "bringing note to top");
        let store = self.store_mut();
        for ((id, _), z) in others.into_iter().zip(0_i64..) {
            restack(store, &id, z)?;
        }
        restack(store, &own, top)
    }
}

fn restack(store: &mut TabletopStore, identifier: &Identifier, z_index: i64) -> Result<(), SyncError> {
    let Some(placed) = store
        .get_mut(identifier)
        .and_then(|node| node.kind_mut().placed_mut())
    else {
        return Err(SyncError::ObjectNotFound(identifier.clone()));
    };
    if placed.z_index() == z_index {
        return Ok(());
    }
    placed.set_z_index(z_index);
    store.update(identifier)
}
