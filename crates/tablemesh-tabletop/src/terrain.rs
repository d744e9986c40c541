//! Terrain blocks.

use std::ops::{Deref, DerefMut};

use tablemesh_core::error::SyncError;
use tablemesh_core::identifier::Identifier;
use tablemesh_core::value::DataValue;
use tablemesh_object::data_element::DataElementType;
use tablemesh_object::node::NodeTree;

use crate::fields::{TerrainFields, TerrainViewMode};
use crate::kind::{TERRAIN_ALIAS, TabletopKind, TabletopStore};
use crate::object::{
    COMMON_SECTION, DETAIL_SECTION, IMAGE_SECTION, NAME_ELEMENT, TabletopObject, data_element,
    object_tree, section,
};

/// Default edge length of a new terrain block, in grid squares.
pub const DEFAULT_TERRAIN_EDGE: f64 = 2.0;

/// Image element for the walls.
pub const WALL_ELEMENT: &str = "wall";
/// Image element for the floor.
pub const FLOOR_ELEMENT: &str = "floor";

/// Dimensions of a terrain block, in grid squares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainSize {
    /// Extent along x.
    pub width: f64,
    /// Extent along z.
    pub height: f64,
    /// Extent along y.
    pub depth: f64,
}

impl Default for TerrainSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_TERRAIN_EDGE,
            height: DEFAULT_TERRAIN_EDGE,
            depth: DEFAULT_TERRAIN_EDGE,
        }
    }
}

/// Builds an unregistered terrain block with its sections seeded.
#[must_use]
pub fn create_terrain(
    name: &str,
    size: TerrainSize,
    wall_image: &str,
    floor_image: &str,
) -> NodeTree<TabletopKind> {
    object_tree(
        TabletopKind::Terrain(TerrainFields::default()),
        section(IMAGE_SECTION)
            .with_child(data_element(
                WALL_ELEMENT,
                DataValue::text(wall_image),
                Some(DataElementType::Image),
            ))
            .with_child(data_element(
                FLOOR_ELEMENT,
                DataValue::text(floor_image),
                Some(DataElementType::Image),
            )),
        section(COMMON_SECTION)
            .with_child(data_element(NAME_ELEMENT, DataValue::text(name), None))
            .with_child(data_element("width", size.width, None))
            .with_child(data_element("height", size.height, None))
            .with_child(data_element("depth", size.depth, None))
            .with_child(data_element("altitude", 0.0, None)),
        section(DETAIL_SECTION),
    )
}

/// Read/write access to a terrain block.
#[derive(Debug)]
pub struct Terrain<'a> {
    object: TabletopObject<'a>,
}

impl<'a> Deref for Terrain<'a> {
    type Target = TabletopObject<'a>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl DerefMut for Terrain<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}

impl<'a> Terrain<'a> {
    /// Opens a live terrain block.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ObjectNotFound` / `ObjectDestroyed` if the
    /// identifier is not live and `SyncError::KindMismatch` if the node is
    /// not terrain.
    pub fn open(store: &'a mut TabletopStore, identifier: &Identifier) -> Result<Self, SyncError> {
        Ok(Self {
            object: TabletopObject::open_alias(store, identifier, TERRAIN_ALIAS)?,
        })
    }

    fn fields(&self) -> TerrainFields {
        match self.kind() {
            Some(TabletopKind::Terrain(fields)) => fields.clone(),
            _ => TerrainFields::default(),
        }
    }

    /// The block's dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the terrain is no longer live.
    pub fn size(&mut self) -> Result<TerrainSize, SyncError> {
        Ok(TerrainSize {
            width: self.number(COMMON_SECTION, "width", DEFAULT_TERRAIN_EDGE)?,
            height: self.number(COMMON_SECTION, "height", DEFAULT_TERRAIN_EDGE)?,
            depth: self.number(COMMON_SECTION, "depth", DEFAULT_TERRAIN_EDGE)?,
        })
    }

    /// Resizes the block.
    ///
    /// # Errors
    ///
    /// Returns an error if the terrain is no longer live.
    pub fn set_size(&mut self, size: TerrainSize) -> Result<(), SyncError> {
        self.set_value(COMMON_SECTION, "width", DataValue::Number(size.width))?;
        self.set_value(COMMON_SECTION, "height", DataValue::Number(size.height))?;
        self.set_value(COMMON_SECTION, "depth", DataValue::Number(size.depth))
    }

    /// Height of the block's base above the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the terrain is no longer live.
    pub fn altitude(&mut self) -> Result<f64, SyncError> {
        self.number(COMMON_SECTION, "altitude", 0.0)
    }

    /// Wall image identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the terrain is no longer live.
    pub fn wall_image(&mut self) -> Result<String, SyncError> {
        self.image(WALL_ELEMENT)
    }

    /// Floor image identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the terrain is no longer live.
    pub fn floor_image(&mut self) -> Result<String, SyncError> {
        self.image(FLOOR_ELEMENT)
    }

    fn image(&mut self, name: &str) -> Result<String, SyncError> {
        let id = self.element_in(IMAGE_SECTION, name, Some(DataElementType::Image), DataValue::Empty)?;
        Ok(self.element_value(&id).to_text())
    }

    /// Which faces are drawn.
    #[must_use]
    pub fn view_mode(&self) -> TerrainViewMode {
        self.fields().mode
    }

    /// True if walls are drawn.
    #[must_use]
    pub fn has_wall(&self) -> bool {
        self.view_mode().contains(TerrainViewMode::WALL)
    }

    /// True if the floor is drawn.
    #[must_use]
    pub fn has_floor(&self) -> bool {
        self.view_mode().contains(TerrainViewMode::FLOOR)
    }

    /// Chooses which faces are drawn.
    ///
    /// # Errors
    ///
    /// Returns an error if the terrain is no longer live.
    pub fn set_view_mode(&mut self, mode: TerrainViewMode) -> Result<(), SyncError> {
        self.modify(|kind| {
            if let TabletopKind::Terrain(fields) = kind {
                fields.mode = mode;
            }
        })
    }

    /// True if the block ignores pointer interaction.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.fields().is_locked
    }

    /// Locks or unlocks the block.
    ///
    /// # Errors
    ///
    /// Returns an error if the terrain is no longer live.
    pub fn set_locked(&mut self, locked: bool) -> Result<(), SyncError> {
        self.modify(|kind| {
            if let TabletopKind::Terrain(fields) = kind {
                fields.is_locked = locked;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall(store: &mut TabletopStore) -> Identifier {
        store
            .insert_tree(
                create_terrain("Wall", TerrainSize::default(), "stone", "grass"),
                None,
            )
            .unwrap()
    }

    #[test]
    fn test_create_terrain_seeds_dimensions_and_images() {
        // Arrange
        let mut store = TabletopStore::new();
        let id = wall(&mut store);

        // Act
        let mut terrain = Terrain::open(&mut store, &id).unwrap();

        // Assert
        assert_eq!(terrain.size().unwrap(), TerrainSize::default());
        assert!(terrain.altitude().unwrap().abs() < f64::EPSILON);
        assert_eq!(terrain.wall_image().unwrap(), "stone");
        assert_eq!(terrain.floor_image().unwrap(), "grass");
        assert_eq!(terrain.view_mode(), TerrainViewMode::ALL);
    }

    #[test]
    fn test_view_mode_controls_faces() {
        let mut store = TabletopStore::new();
        let id = wall(&mut store);
        let mut terrain = Terrain::open(&mut store, &id).unwrap();

        terrain.set_view_mode(TerrainViewMode::FLOOR).unwrap();

        assert!(terrain.has_floor());
        assert!(!terrain.has_wall());
    }

    #[test]
    fn test_set_size_overwrites_common_elements() {
        let mut store = TabletopStore::new();
        let id = wall(&mut store);
        let mut terrain = Terrain::open(&mut store, &id).unwrap();
        let size = TerrainSize {
            width: 4.0,
            height: 1.0,
            depth: 0.5,
        };

        terrain.set_size(size).unwrap();
        terrain.set_locked(true).unwrap();

        assert_eq!(terrain.size().unwrap(), size);
        assert!(terrain.is_locked());
    }
}
