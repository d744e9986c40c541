//! Shared helpers for peer session integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tablemesh_core::clock::Clock;
use tablemesh_core::config::MeshConfig;
use tablemesh_core::identifier::{Identifier, PeerId};
use tablemesh_event_bus::relay::Transport;
use tablemesh_session::session::PeerSession;
use tablemesh_tabletop::object::{COMMON_SECTION, NAME_ELEMENT};
use tablemesh_test_support::{FixedClock, LoopbackMesh};

/// Upper bound on delivery rounds before a test is considered stuck.
const MAX_DELIVERY_ROUNDS: usize = 32;

/// Fixed timestamp used across all integration tests.
pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::at_millis(1_768_471_200_000))
}

/// Configuration that broadcasts every edit immediately.
pub fn immediate(peer: &str) -> MeshConfig {
    MeshConfig::for_peer(PeerId::from(peer)).with_update_throttle(Duration::ZERO)
}

/// A session on `transport` with the fixed clock.
pub fn session(config: MeshConfig, transport: impl Transport + 'static) -> PeerSession {
    PeerSession::new(config, Box::new(transport), fixed_clock())
}

/// Connects one immediate-flush session per name to a fresh loopback mesh.
pub fn mesh(names: &[&str]) -> (LoopbackMesh, Vec<PeerSession>) {
    let loopback = LoopbackMesh::new();
    let peers = names
        .iter()
        .map(|name| {
            let transport = loopback.transport(&PeerId::from(*name));
            session(immediate(name), transport)
        })
        .collect();
    (loopback, peers)
}

/// Delivers waiting messages, including the ones handlers send in
/// response, until the mesh is quiet. Returns the number delivered.
pub fn deliver_all(mesh: &LoopbackMesh, peers: &mut [PeerSession]) -> usize {
    let mut delivered = 0;
    for _ in 0..MAX_DELIVERY_ROUNDS {
        if mesh.total_pending() == 0 {
            return delivered;
        }
        for peer in peers.iter_mut() {
            let id = peer.peer_id().clone();
            for bytes in mesh.drain(&id) {
                peer.receive(&bytes);
                delivered += 1;
            }
        }
    }
    panic!("mesh did not settle after {MAX_DELIVERY_ROUNDS} rounds");
}

/// Identifier of `common/name` under an object.
pub fn name_element(peer: &PeerSession, object: &Identifier) -> Identifier {
    let common = peer
        .store()
        .first_element_by_name(object, COMMON_SECTION)
        .expect("common section");
    peer.store()
        .first_element_by_name(&common, NAME_ELEMENT)
        .expect("name element")
}

/// Value of `common/name` under an object.
pub fn name_of(peer: &PeerSession, object: &Identifier) -> String {
    let id = name_element(peer, object);
    peer.store()
        .element(&id)
        .map(|e| e.value.to_text())
        .unwrap_or_default()
}
