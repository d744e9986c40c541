//! Tablemesh Session: one peer's replica wired to the mesh.
//!
//! A [`session::PeerSession`] owns the peer's object store and event bus.
//! Local edits are recorded in the store and broadcast on flush; notices
//! from other peers are applied to the replica by the handlers in
//! [`handlers`]. The [`runtime`] module runs sessions as tokio tasks
//! connected through in-process channels.

pub mod chat;
pub mod context;
pub mod handlers;
pub mod runtime;
pub mod session;
