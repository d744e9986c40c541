//! Integration tests for replicating objects across peers.

mod common;

use std::sync::{Arc, Mutex};

use tablemesh_core::event::{Envelope, UPDATE_GAME_OBJECT};
use tablemesh_core::identifier::PeerId;
use tablemesh_core::value::DataValue;
use tablemesh_event_bus::bus::DEFAULT_PRIORITY;
use tablemesh_object::node::Lifecycle;
use tablemesh_tabletop::character::{GameCharacter, create_character};
use tablemesh_tabletop::kind::{CHARACTER_ALIAS, PIECE_ALIAS, TabletopKind};
use tablemesh_tabletop::object::{COMMON_SECTION, TabletopObject};
use tablemesh_tabletop::piece::create_piece;
use tablemesh_test_support::{FailingTransport, RecordingTransport};

#[test]
fn test_added_object_replicates_to_every_peer() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob", "carol"]);

    // Act
    let id = peers[0]
        .add_object(create_character("Bob", 1.0, "img-bob"), None)
        .unwrap();
    common::deliver_all(&mesh, &mut peers);

    // Assert
    let expected = peers[0].export_xml(&id).unwrap();
    for peer in &peers[1..] {
        assert_eq!(peer.store().get_objects(CHARACTER_ALIAS).len(), 1);
        assert_eq!(peer.export_xml(&id).unwrap(), expected);
        assert_eq!(peer.store().len(), peers[0].store().len());
    }
}

#[test]
fn test_field_update_replicates() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob"]);
    let id = peers[0]
        .add_object(create_character("Bob", 1.0, "img-bob"), None)
        .unwrap();
    common::deliver_all(&mesh, &mut peers);

    // Act
    peers[0]
        .edit(|store| GameCharacter::open(store, &id)?.set_rotate(90.0))
        .unwrap();
    peers[0]
        .edit(|store| TabletopObject::open(store, &id)?.set_name("Robert"))
        .unwrap();
    common::deliver_all(&mesh, &mut peers);

    // Assert
    match peers[1].store().get(&id).unwrap().kind() {
        TabletopKind::Character(fields) => assert!((fields.rotate - 90.0).abs() < f64::EPSILON),
        other => panic!("expected a character, got {other:?}"),
    }
    assert_eq!(common::name_of(&peers[1], &id), "Robert");
}

#[test]
fn test_remote_updates_are_not_rebroadcast() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob", "carol"]);
    peers[0]
        .add_object(create_piece("Pawn", "img"), None)
        .unwrap();
    let sent_by_origin = mesh.sent();

    // Act
    common::deliver_all(&mesh, &mut peers);

    // Assert
    assert_eq!(mesh.sent(), sent_by_origin);
    assert_eq!(mesh.total_pending(), 0);
    for peer in &peers {
        assert!(!peer.store().has_pending_changes());
    }
}

#[test]
fn test_handlers_see_origin_flag() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob"]);
    let seen: Arc<Mutex<Vec<(PeerId, bool)>>> = Arc::default();
    for peer in &mut peers {
        let seen = Arc::clone(&seen);
        let me = peer.peer_id().clone();
        peer.bus_mut().register("observer").on(
            UPDATE_GAME_OBJECT,
            DEFAULT_PRIORITY,
            move |record, _ctx| {
                seen.lock().unwrap().push((me.clone(), record.is_send_from_self));
            },
        );
    }

    // Act
    let id = peers[0]
        .add_object(create_piece("Pawn", "img"), None)
        .unwrap();
    peers[0].update(&id).unwrap();
    common::deliver_all(&mesh, &mut peers);

    // Assert
    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    for (peer, from_self) in seen.iter() {
        assert_eq!(*from_self, peer.as_str() == "alice");
    }
}

#[test]
fn test_destroy_replicates_and_late_update_is_ignored() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob", "carol"]);
    let id = peers[0]
        .add_object(create_piece("Pawn", "img"), None)
        .unwrap();
    common::deliver_all(&mesh, &mut peers);
    let name = common::name_element(&peers[0], &id);

    // Act
    peers[1].destroy(&id).unwrap();
    peers[0]
        .edit(|store| TabletopObject::open(store, &id)?.set_name("Orc"))
        .unwrap();
    common::deliver_all(&mesh, &mut peers);

    // Assert
    for peer in &peers {
        assert!(peer.store().get(&id).is_none());
        assert!(peer.store().get_objects(PIECE_ALIAS).is_empty());
    }
    assert_eq!(peers[2].store().lifecycle(&name), Lifecycle::Destroyed);
    assert!(peers[2].store().is_empty());
}

#[test]
fn test_children_arriving_before_parent_are_adopted() {
    // Arrange
    let recorder = RecordingTransport::new();
    let mut alice = common::session(common::immediate("alice"), recorder.clone());
    let mut bob = common::session(common::immediate("bob"), FailingTransport);
    let id = alice
        .add_object(create_character("Bob", 1.0, "img"), None)
        .unwrap();
    let envelopes: Vec<Envelope> = recorder.envelopes();

    // Act
    for envelope in envelopes.iter().rev() {
        bob.receive(&serde_json::to_vec(envelope).unwrap());
    }

    // Assert
    assert_eq!(bob.store().len(), alice.store().len());
    assert_eq!(bob.export_xml(&id), alice.export_xml(&id));
}

#[test]
fn test_update_with_garbled_placement_still_applies_fields() {
    // Arrange
    let recorder = RecordingTransport::new();
    let mut alice = common::session(common::immediate("alice"), recorder.clone());
    let mut bob = common::session(common::immediate("bob"), FailingTransport);
    let id = alice.add_object(create_piece("Pawn", "img"), None).unwrap();
    for envelope in recorder.envelopes() {
        bob.receive(&serde_json::to_vec(&envelope).unwrap());
    }
    let section = alice.store().first_element_by_name(&id, COMMON_SECTION).unwrap();
    let mut garbled = recorder
        .envelopes()
        .into_iter()
        .find(|envelope| {
            envelope.event_name == UPDATE_GAME_OBJECT
                && envelope.data["identifier"] == section.as_str()
        })
        .unwrap();
    garbled.data["index"] = serde_json::json!("one");
    garbled.data["version"] = serde_json::json!("ten");
    garbled.data["syncData"]["value"] = serde_json::json!("shared");

    // Act
    bob.receive(&serde_json::to_vec(&garbled).unwrap());

    // Assert
    assert_eq!(
        bob.store().element(&section).unwrap().value,
        DataValue::Text("shared".to_owned())
    );
    assert_eq!(
        bob.store().get(&id).unwrap().children(),
        alice.store().get(&id).unwrap().children()
    );
}

#[test]
fn test_duplicate_creates_independent_copy() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob"]);
    let id = peers[0]
        .add_object(create_piece("Pawn", "img"), None)
        .unwrap();

    // Act
    let copy = peers[0].duplicate(&id).unwrap();
    peers[0]
        .edit(|store| TabletopObject::open(store, &copy)?.set_name("Pawn 2"))
        .unwrap();
    common::deliver_all(&mesh, &mut peers);

    // Assert
    assert_ne!(copy, id);
    assert_eq!(peers[1].store().get_objects(PIECE_ALIAS).len(), 2);
    assert_eq!(common::name_of(&peers[1], &id), "Pawn");
    assert_eq!(common::name_of(&peers[1], &copy), "Pawn 2");
}

#[test]
fn test_throttled_session_waits_for_flush() {
    // Arrange
    let recorder = RecordingTransport::new();
    let config = tablemesh_core::config::MeshConfig::for_peer(PeerId::from("alice"));
    let mut alice = common::session(config, recorder.clone());

    // Act
    let id = alice.add_object(create_piece("Pawn", "img"), None).unwrap();
    alice.update(&id).unwrap();
    let before_flush = recorder.envelopes().len();
    let sent = alice.flush();

    // Assert
    assert_eq!(before_flush, 0);
    assert_eq!(sent, alice.store().len());
    assert!(
        recorder
            .event_names()
            .iter()
            .all(|name| name == UPDATE_GAME_OBJECT)
    );
    assert_eq!(alice.flush(), 0);
}

#[test]
fn test_transport_failure_never_reaches_caller() {
    // Arrange
    let mut alice = common::session(common::immediate("alice"), FailingTransport);

    // Act
    let id = alice.add_object(create_piece("Pawn", "img"), None);
    let destroyed = id.as_ref().map(|id| alice.destroy(id));

    // Assert
    assert!(id.is_ok());
    assert!(matches!(destroyed, Ok(Ok(_))));
    assert!(alice.store().is_empty());
}

#[test]
fn test_session_palette_evaluation_uses_character_data() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob"]);
    let id = peers[0]
        .add_object(create_character("Bob", 1.0, "img"), None)
        .unwrap();
    peers[0]
        .edit(|store| GameCharacter::open(store, &id)?.set_palette("//dmg=1d6\n{dmg}+{HP}"))
        .unwrap();
    common::deliver_all(&mesh, &mut peers);

    // Act
    let result = peers[1].evaluate_palette(&id, "{dmg}+{HP}").unwrap();

    // Assert
    assert_eq!(result, "1d6+200");
}

#[test]
fn test_disconnected_peer_misses_broadcasts() {
    // Arrange
    let (mesh, mut peers) = common::mesh(&["alice", "bob", "carol"]);

    // Act
    mesh.disconnect(&PeerId::from("carol"));
    peers[0]
        .add_object(create_piece("Lost", "img"), None)
        .unwrap();
    common::deliver_all(&mesh, &mut peers);

    // Assert
    assert_eq!(peers[1].store().get_objects(PIECE_ALIAS).len(), 1);
    assert!(peers[2].store().is_empty());
}
