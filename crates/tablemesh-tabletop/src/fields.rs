//! Synchronized field sets of the tabletop kinds.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use tablemesh_object::schema::FieldValue;

/// Surface a freshly created object is placed on.
pub const DEFAULT_SURFACE: &str = "table";

/// Where an object sits.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Named surface (table, a card stack, a player's hand).
    pub name: String,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            name: DEFAULT_SURFACE.to_owned(),
            x: 0.0,
            y: 0.0,
        }
    }
}

/// Field sets of objects that have a position on a surface.
pub trait Placed {
    /// Current location.
    fn location(&self) -> Location;

    /// Moves the object.
    fn set_location(&mut self, location: &Location);

    /// Stacking order among objects on the same surface.
    fn z_index(&self) -> i64;

    /// Sets the stacking order.
    fn set_z_index(&mut self, z_index: i64);
}

macro_rules! impl_placed {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Placed for $ty {
                fn location(&self) -> Location {
                    Location {
                        name: self.location_name.clone(),
                        x: self.x,
                        y: self.y,
                    }
                }

                fn set_location(&mut self, location: &Location) {
                    self.location_name.clone_from(&location.name);
                    self.x = location.x;
                    self.y = location.y;
                }

                fn z_index(&self) -> i64 {
                    self.z_index
                }

                fn set_z_index(&mut self, z_index: i64) {
                    self.z_index = z_index;
                }
            }
        )*
    };
}

tablemesh_object::sync_fields! {
    /// Fields of a generic tabletop piece.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PieceFields {
        pub location_name: String = DEFAULT_SURFACE.to_owned() => "location.name",
        pub x: f64 = 0.0 => "location.x",
        pub y: f64 = 0.0 => "location.y",
        pub z_index: i64 = 0 => "zindex",
    }
}

tablemesh_object::sync_fields! {
    /// Fields of a playing-piece character.
    #[derive(Debug, Clone, PartialEq)]
    pub struct CharacterFields {
        pub location_name: String = DEFAULT_SURFACE.to_owned() => "location.name",
        pub x: f64 = 0.0 => "location.x",
        pub y: f64 = 0.0 => "location.y",
        pub z_index: i64 = 0 => "zindex",
        /// Rotation in degrees.
        pub rotate: f64 = 0.0 => "rotate",
        /// Tilt in degrees.
        pub roll: f64 = 0.0 => "roll",
        /// Number of facing directions the piece snaps to.
        pub direction_count: u32 = 1 => "directionCount",
    }
}

tablemesh_object::sync_fields! {
    /// Fields of a terrain block.
    #[derive(Debug, Clone, PartialEq)]
    pub struct TerrainFields {
        pub location_name: String = DEFAULT_SURFACE.to_owned() => "location.name",
        pub x: f64 = 0.0 => "location.x",
        pub y: f64 = 0.0 => "location.y",
        pub z_index: i64 = 0 => "zindex",
        /// Locked terrain ignores pointer interaction.
        pub is_locked: bool = false => "isLocked",
        /// Which faces are drawn.
        pub mode: TerrainViewMode = TerrainViewMode::ALL => "mode",
        /// Rotation in degrees.
        pub rotate: f64 = 0.0 => "rotate",
    }
}

tablemesh_object::sync_fields! {
    /// Fields of a text note.
    #[derive(Debug, Clone, PartialEq)]
    pub struct TextNoteFields {
        pub location_name: String = DEFAULT_SURFACE.to_owned() => "location.name",
        pub x: f64 = 0.0 => "location.x",
        pub y: f64 = 0.0 => "location.y",
        pub z_index: i64 = 0 => "zindex",
    }
}

impl_placed!(PieceFields, CharacterFields, TerrainFields, TextNoteFields);

/// Faces of a terrain block that are drawn, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TerrainViewMode(u8);

impl TerrainViewMode {
    /// Nothing is drawn.
    pub const NONE: Self = Self(0);
    /// Only the floor is drawn.
    pub const FLOOR: Self = Self(1);
    /// Only the walls are drawn.
    pub const WALL: Self = Self(2);
    /// Floor and walls are drawn.
    pub const ALL: Self = Self(3);

    /// Builds a mode from its bits, or `None` if unknown bits are set.
    #[must_use]
    pub fn from_bits(bits: u8) -> Option<Self> {
        (bits & !Self::ALL.0 == 0).then_some(Self(bits))
    }

    /// The raw bits.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// True if every face in `other` is drawn.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TerrainViewMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl TryFrom<u8> for TerrainViewMode {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(bits).ok_or_else(|| format!("invalid terrain view mode: {bits}"))
    }
}

impl From<TerrainViewMode> for u8 {
    fn from(mode: TerrainViewMode) -> Self {
        mode.0
    }
}

impl fmt::Display for TerrainViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FieldValue for TerrainViewMode {
    fn to_text(&self) -> String {
        self.0.to_string()
    }

    fn from_text(text: &str) -> Option<Self> {
        text.trim().parse().ok().and_then(Self::from_bits)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tablemesh_object::schema::{ApplyReport, SyncMap, SyncSchema};

    use super::*;

    #[test]
    fn test_view_mode_bits_compose() {
        let mode = TerrainViewMode::FLOOR | TerrainViewMode::WALL;

        assert_eq!(mode, TerrainViewMode::ALL);
        assert!(mode.contains(TerrainViewMode::WALL));
        assert!(!TerrainViewMode::FLOOR.contains(TerrainViewMode::WALL));
        assert!(TerrainViewMode::NONE.contains(TerrainViewMode::NONE));
        assert_eq!(TerrainViewMode::from_bits(4), None);
    }

    #[test]
    fn test_garbled_view_mode_is_rejected_per_field() {
        // Arrange
        let mut fields = TerrainFields::default();
        let mut map = SyncMap::new();
        map.insert("mode".to_owned(), json!(9));
        map.insert("isLocked".to_owned(), json!(true));
        let mut report = ApplyReport::default();

        // Act
        fields.read_sync_map(&map, &mut report);

        // Assert
        assert_eq!(fields.mode, TerrainViewMode::ALL);
        assert!(fields.is_locked);
        assert_eq!(report.rejected, vec!["mode".to_owned()]);
    }

    #[test]
    fn test_placed_reads_and_writes_location_fields() {
        let mut fields = CharacterFields::default();

        fields.set_location(&Location {
            name: "hand".to_owned(),
            x: 10.0,
            y: -4.5,
        });

        assert_eq!(fields.location().name, "hand");
        assert_eq!(fields.to_sync_map()["location.x"], json!(10.0));
        assert_eq!(Location::default().name, DEFAULT_SURFACE);
    }
}
