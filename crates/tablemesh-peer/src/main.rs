//! Tablemesh demo entry point.
//!
//! Starts `TABLEMESH_PEERS` in-process peers on a channel hub, plays a
//! short table session on the first one and lets a late joiner catch up
//! through the catalogue handshake.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tablemesh_core::clock::SystemClock;
use tablemesh_core::config::MeshConfig;
use tablemesh_core::error::SyncError;
use tablemesh_core::identifier::PeerId;
use tablemesh_session::chat::ChatDraft;
use tablemesh_session::runtime::{ChannelHub, PeerHandle, run_peer};
use tablemesh_session::session::PeerSession;
use tablemesh_tabletop::character::{GameCharacter, create_character};
use tablemesh_tabletop::fields::Location;
use tablemesh_tabletop::object::TabletopObject;
use tablemesh_tabletop::piece::create_piece;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Time given to the mesh to deliver everything in flight.
const SETTLE_TIME: Duration = Duration::from_millis(200);

struct RunningPeer {
    handle: PeerHandle,
    task: JoinHandle<PeerSession>,
}

fn start_peer(
    hub: &ChannelHub,
    base: &MeshConfig,
    name: &str,
    shutdown: &watch::Receiver<bool>,
) -> Result<RunningPeer, Box<dyn Error>> {
    let peer = PeerId::from(name);
    let (transport, inbox) = hub.connect(&peer)?;
    let mut config = base.clone();
    config.peer_id = peer.clone();
    let session = PeerSession::new(config, Box::new(transport), Arc::new(SystemClock));
    let (handle, commands) = PeerHandle::new(peer);
    let task = tokio::spawn(run_peer(session, inbox, commands, shutdown.clone()));
    Ok(RunningPeer { handle, task })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Read configuration from environment.
    let base = MeshConfig::from_env()?;
    let peer_count: usize = std::env::var("TABLEMESH_PEERS")
        .unwrap_or_else(|_| "3".to_string())
        .parse()
        .map_err(|e| format!("TABLEMESH_PEERS must be a positive integer: {e}"))?;
    if peer_count == 0 {
        return Err("TABLEMESH_PEERS must be a positive integer".into());
    }
    tracing::info!(peers = peer_count, throttle = ?base.update_throttle, "starting mesh");

    let hub = ChannelHub::new();
    let (stop, shutdown) = watch::channel(false);
    let mut peers = (0..peer_count)
        .map(|i| start_peer(&hub, &base, &format!("peer-{i}"), &shutdown))
        .collect::<Result<Vec<_>, _>>()?;

    // Play a short session on the first peer.
    let host = peers[0].handle.clone();
    let hero = host
        .with(|session| {
            let hero = session.add_object(create_character("Aria", 1.0, "aria.png"), None)?;
            session.edit(|store| {
                GameCharacter::open(store, &hero)?.set_palette("//sword=1d8+3\nAttack: {sword}\nHP {HP}")
            })?;
            Ok::<_, SyncError>(hero)
        })
        .await??;
    let line = {
        let hero = hero.clone();
        host.with(move |session| session.evaluate_palette(&hero, "Attack: {sword} with {HP} HP"))
            .await??
    };
    host.with(move |session| session.send_chat_message(ChatDraft::new("main", "Aria", &line)))
        .await??;
    host.with(|session| {
        let pawn = session.add_object(create_piece("Lantern", "lantern.png"), None)?;
        session.edit(|store| {
            TabletopObject::open(store, &pawn)?.set_location(&Location {
                x: 150.0,
                y: 75.0,
                ..Location::default()
            })
        })
    })
    .await??;
    tokio::time::sleep(SETTLE_TIME).await;

    // Bring in a late joiner and announce the host's catalogue to it.
    let late = start_peer(&hub, &base, "late-joiner", &shutdown)?;
    let late_id = late.handle.peer_id().clone();
    host.with(move |session| session.peer_connected(&late_id)).await?;
    peers.push(late);
    tokio::time::sleep(SETTLE_TIME).await;

    stop.send(true)?;
    for peer in peers {
        let session = peer.task.await?;
        tracing::info!(
            peer = %session.peer_id(),
            objects = session.store().len(),
            messages = session.chat().len(),
            has_hero = session.store().get(&hero).is_some(),
            "peer finished"
        );
    }

    Ok(())
}
