//! Generic tabletop pieces.

use tablemesh_core::value::DataValue;
use tablemesh_object::data_element::DataElementType;
use tablemesh_object::node::NodeTree;

use crate::fields::PieceFields;
use crate::kind::TabletopKind;
use crate::object::{
    COMMON_SECTION, DETAIL_SECTION, IMAGE_IDENTIFIER_ELEMENT, IMAGE_SECTION, NAME_ELEMENT,
    data_element, object_tree, section,
};

/// Builds an unregistered piece with its sections seeded.
#[must_use]
pub fn create_piece(name: &str, image_identifier: &str) -> NodeTree<TabletopKind> {
    object_tree(
        TabletopKind::Piece(PieceFields::default()),
        section(IMAGE_SECTION).with_child(data_element(
            IMAGE_IDENTIFIER_ELEMENT,
            DataValue::text(image_identifier),
            Some(DataElementType::Image),
        )),
        section(COMMON_SECTION).with_child(data_element(NAME_ELEMENT, DataValue::text(name), None)),
        section(DETAIL_SECTION),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{PIECE_ALIAS, TabletopStore};
    use crate::object::TabletopObject;

    #[test]
    fn test_create_piece_seeds_name_and_image() {
        // Arrange
        let mut store = TabletopStore::new();

        // Act
        let id = store.insert_tree(create_piece("Goblin", "img-7"), None).unwrap();

        // Assert
        let mut piece = TabletopObject::open(&mut store, &id).unwrap();
        assert_eq!(piece.name().unwrap(), "Goblin");
        assert_eq!(piece.image_identifier().unwrap(), "img-7");
        assert_eq!(store.get_objects(PIECE_ALIAS).len(), 1);
        assert_eq!(store.len(), 6);
    }
}
