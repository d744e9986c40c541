//! The closed set of tabletop node kinds.

use tablemesh_object::data_element::{DATA_ELEMENT_ALIAS, DataElement};
use tablemesh_object::kind::NodeKind;
use tablemesh_object::schema::{ApplyReport, SyncMap, SyncSchema};
use tablemesh_object::store::ObjectStore;

use crate::chat_palette::{CHAT_PALETTE_ALIAS, ChatPalette};
use crate::fields::{CharacterFields, PieceFields, Placed, TerrainFields, TextNoteFields};

/// Alias name of generic pieces.
pub const PIECE_ALIAS: &str = "game-piece";
/// Alias name of characters.
pub const CHARACTER_ALIAS: &str = "character";
/// Alias name of terrain blocks.
pub const TERRAIN_ALIAS: &str = "terrain";
/// Alias name of text notes.
pub const TEXT_NOTE_ALIAS: &str = "text-note";

/// Alias names of objects with `image`/`common`/`detail` sections.
pub const TABLETOP_OBJECT_ALIASES: &[&str] =
    &[PIECE_ALIAS, CHARACTER_ALIAS, TERRAIN_ALIAS, TEXT_NOTE_ALIAS];

/// Store of tabletop nodes.
pub type TabletopStore = ObjectStore<TabletopKind>;

/// Every kind of node a tabletop session replicates.
#[derive(Debug, Clone, PartialEq)]
pub enum TabletopKind {
    /// A generic piece.
    Piece(PieceFields),
    /// A playing-piece character.
    Character(CharacterFields),
    /// A terrain block.
    Terrain(TerrainFields),
    /// A text note.
    TextNote(TextNoteFields),
    /// A chat palette, usually owned by a character.
    ChatPalette(ChatPalette),
    /// A data element of some object's data tree.
    Data(DataElement),
}

impl TabletopKind {
    /// Position fields, for kinds placed on a surface.
    #[must_use]
    pub fn placed(&self) -> Option<&dyn Placed> {
        match self {
            Self::Piece(fields) => Some(fields),
            Self::Character(fields) => Some(fields),
            Self::Terrain(fields) => Some(fields),
            Self::TextNote(fields) => Some(fields),
            Self::ChatPalette(_) | Self::Data(_) => None,
        }
    }

    /// Mutable position fields, for kinds placed on a surface.
    pub fn placed_mut(&mut self) -> Option<&mut dyn Placed> {
        match self {
            Self::Piece(fields) => Some(fields),
            Self::Character(fields) => Some(fields),
            Self::Terrain(fields) => Some(fields),
            Self::TextNote(fields) => Some(fields),
            Self::ChatPalette(_) | Self::Data(_) => None,
        }
    }

    /// True for kinds that own `image`/`common`/`detail` sections.
    #[must_use]
    pub fn is_tabletop_object(&self) -> bool {
        self.placed().is_some()
    }
}

impl NodeKind for TabletopKind {
    fn alias_name(&self) -> &'static str {
        match self {
            Self::Piece(_) => PIECE_ALIAS,
            Self::Character(_) => CHARACTER_ALIAS,
            Self::Terrain(_) => TERRAIN_ALIAS,
            Self::TextNote(_) => TEXT_NOTE_ALIAS,
            Self::ChatPalette(_) => CHAT_PALETTE_ALIAS,
            Self::Data(_) => DATA_ELEMENT_ALIAS,
        }
    }

    fn instantiate(alias_name: &str) -> Option<Self> {
        match alias_name {
            PIECE_ALIAS => Some(Self::Piece(PieceFields::default())),
            CHARACTER_ALIAS => Some(Self::Character(CharacterFields::default())),
            TERRAIN_ALIAS => Some(Self::Terrain(TerrainFields::default())),
            TEXT_NOTE_ALIAS => Some(Self::TextNote(TextNoteFields::default())),
            CHAT_PALETTE_ALIAS => Some(Self::ChatPalette(ChatPalette::default())),
            DATA_ELEMENT_ALIAS => Some(Self::Data(DataElement::default())),
            _ => None,
        }
    }

    fn sync_fields(&self) -> SyncMap {
        match self {
            Self::Piece(fields) => fields.to_sync_map(),
            Self::Character(fields) => fields.to_sync_map(),
            Self::Terrain(fields) => fields.to_sync_map(),
            Self::TextNote(fields) => fields.to_sync_map(),
            Self::ChatPalette(palette) => palette.to_sync_map(),
            Self::Data(element) => element.to_sync_map(),
        }
    }

    fn apply_sync_fields(&mut self, map: &SyncMap) -> ApplyReport {
        let mut report = ApplyReport::default();
        match self {
            Self::Piece(fields) => fields.read_sync_map(map, &mut report),
            Self::Character(fields) => fields.read_sync_map(map, &mut report),
            Self::Terrain(fields) => fields.read_sync_map(map, &mut report),
            Self::TextNote(fields) => fields.read_sync_map(map, &mut report),
            Self::ChatPalette(palette) => palette.read_sync_map(map, &mut report),
            Self::Data(element) => element.read_sync_map(map, &mut report),
        }
        report
    }

    fn xml_attributes(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        match self {
            Self::Piece(fields) => fields.write_text_fields(&mut out),
            Self::Character(fields) => fields.write_text_fields(&mut out),
            Self::Terrain(fields) => fields.write_text_fields(&mut out),
            Self::TextNote(fields) => fields.write_text_fields(&mut out),
            Self::ChatPalette(palette) => palette.write_text_fields(&mut out),
            Self::Data(element) => element.write_text_fields(&mut out),
        }
        out
    }

    fn apply_xml_attribute(&mut self, name: &str, text: &str) -> Option<bool> {
        match self {
            Self::Piece(fields) => fields.read_text_field(name, text),
            Self::Character(fields) => fields.read_text_field(name, text),
            Self::Terrain(fields) => fields.read_text_field(name, text),
            Self::TextNote(fields) => fields.read_text_field(name, text),
            Self::ChatPalette(palette) => palette.read_text_field(name, text),
            Self::Data(element) => element.read_text_field(name, text),
        }
    }

    fn xml_text(&self) -> Option<String> {
        match self {
            Self::Data(element) => Some(element.value.to_text()),
            Self::ChatPalette(palette) => Some(palette.text().to_owned()),
            _ => None,
        }
    }

    fn apply_xml_text(&mut self, text: &str) {
        match self {
            Self::Data(element) => element.apply_xml_text(text),
            Self::ChatPalette(palette) => palette.set_text(text),
            _ => {}
        }
    }

    fn refresh(&mut self) {
        if let Self::ChatPalette(palette) = self {
            palette.parse();
        }
    }

    fn as_data_element(&self) -> Option<&DataElement> {
        match self {
            Self::Data(element) => Some(element),
            _ => None,
        }
    }

    fn as_data_element_mut(&mut self) -> Option<&mut DataElement> {
        match self {
            Self::Data(element) => Some(element),
            _ => None,
        }
    }

    fn from_data_element(element: DataElement) -> Self {
        Self::Data(element)
    }
}
