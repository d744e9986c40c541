//! Integration tests for selection and XML import, which never leave the
//! peer that raised them.

mod common;

use tablemesh_core::event::SELECT_TABLETOP_OBJECT;
use tablemesh_tabletop::kind::PIECE_ALIAS;
use tablemesh_tabletop::piece::create_piece;
use tablemesh_test_support::RecordingTransport;

#[test]
fn test_select_stays_local() {
    // Arrange
    let recorder = RecordingTransport::new();
    let mut alice = common::session(common::immediate("alice"), recorder.clone());
    let id = alice.add_object(create_piece("Pawn", "img"), None).unwrap();
    recorder.clear();

    // Act
    alice.select(&id).unwrap();

    // Assert
    assert_eq!(alice.selected(), Some(&id));
    assert!(
        !recorder
            .event_names()
            .iter()
            .any(|name| name == SELECT_TABLETOP_OBJECT)
    );
}

#[test]
fn test_select_unknown_object_fails() {
    // Arrange
    let mut alice = common::session(common::immediate("alice"), RecordingTransport::new());

    // Act
    let result = alice.select(&"missing".into());

    // Assert
    assert!(result.is_err());
    assert!(alice.selected().is_none());
}

#[test]
fn test_imported_xml_replicates_under_fresh_identifiers() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob"]);
    let original = peers[0]
        .add_object(create_piece("Pawn", "img"), None)
        .unwrap();
    common::deliver_all(&mesh, &mut peers);
    let xml = peers[0].export_xml(&original).unwrap();

    // Act
    peers[1].import_xml(&xml).unwrap();
    common::deliver_all(&mesh, &mut peers);

    // Assert
    let imported = peers[1].imported().to_vec();
    assert_eq!(imported.len(), 1);
    assert_ne!(imported[0], original);
    assert_eq!(peers[0].store().get_objects(PIECE_ALIAS).len(), 2);
    assert_eq!(common::name_of(&peers[0], &imported[0]), "Pawn");
}

#[test]
fn test_malformed_xml_imports_nothing() {
    // Arrange
    let mut alice = common::session(common::immediate("alice"), RecordingTransport::new());

    // Act
    alice.import_xml("<game-piece>").unwrap();

    // Assert
    assert!(alice.imported().is_empty());
    assert!(alice.store().is_empty());
}

#[test]
fn test_only_xml_files_are_imported() {
    // Arrange
    let mut alice = common::session(common::immediate("alice"), RecordingTransport::new());
    let source = alice.add_object(create_piece("Pawn", "img"), None).unwrap();
    let xml = alice.export_xml(&source).unwrap();

    // Act
    alice.file_loaded("notes.txt", &xml).unwrap();
    let after_text = alice.imported().len();
    alice.file_loaded("PAWN.XML", &xml).unwrap();

    // Assert
    assert_eq!(after_text, 0);
    assert_eq!(alice.imported().len(), 1);
    assert_eq!(alice.store().get_objects(PIECE_ALIAS).len(), 2);
}
