//! Integration tests for the catalogue handshake with late joiners.

mod common;

use tablemesh_core::identifier::PeerId;
use tablemesh_tabletop::character::create_character;
use tablemesh_tabletop::kind::{CHARACTER_ALIAS, PIECE_ALIAS};
use tablemesh_tabletop::object::TabletopObject;
use tablemesh_tabletop::piece::create_piece;

#[test]
fn test_late_joiner_receives_existing_objects() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob"]);
    let piece = peers[0]
        .add_object(create_piece("Pawn", "img"), None)
        .unwrap();
    let character = peers[1]
        .add_object(create_character("Bob", 1.0, "img"), None)
        .unwrap();
    common::deliver_all(&mesh, &mut peers);
    let carol_id = PeerId::from("carol");
    let transport = mesh.transport(&carol_id);
    peers.push(common::session(common::immediate("carol"), transport));

    // Act
    peers[0].peer_connected(&carol_id);
    common::deliver_all(&mesh, &mut peers);

    // Assert
    let carol = &peers[2];
    assert_eq!(carol.store().len(), peers[0].store().len());
    assert_eq!(carol.export_xml(&piece), peers[0].export_xml(&piece));
    assert_eq!(carol.export_xml(&character), peers[0].export_xml(&character));
    assert_eq!(carol.store().get_objects(CHARACTER_ALIAS).len(), 1);
}

#[test]
fn test_up_to_date_peer_requests_nothing() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob"]);
    peers[0]
        .add_object(create_piece("Pawn", "img"), None)
        .unwrap();
    common::deliver_all(&mesh, &mut peers);
    let sent_before = mesh.sent();

    // Act
    peers[0].peer_connected(&PeerId::from("bob"));
    let delivered = common::deliver_all(&mesh, &mut peers);

    // Assert
    assert_eq!(delivered, 1);
    assert_eq!(mesh.sent(), sent_before + 1);
}

#[test]
fn test_catalogue_refreshes_stale_replica() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob"]);
    let id = peers[0]
        .add_object(create_piece("Pawn", "img"), None)
        .unwrap();
    common::deliver_all(&mesh, &mut peers);
    let bob = PeerId::from("bob");
    mesh.disconnect(&bob);
    peers[0]
        .edit(|store| TabletopObject::open(store, &id)?.set_name("Queen"))
        .unwrap();
    let _reconnected = mesh.transport(&bob);

    // Act
    peers[0].peer_connected(&bob);
    common::deliver_all(&mesh, &mut peers);

    // Assert
    assert_eq!(common::name_of(&peers[1], &id), "Queen");
    assert_eq!(peers[1].store().get_objects(PIECE_ALIAS).len(), 1);
}
