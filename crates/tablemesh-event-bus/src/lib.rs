//! Tablemesh Event Bus: local publish/subscribe with peer fan-out.
//!
//! [`bus::EventBus`] dispatches events to handlers in priority order and
//! hands events raised with `call` to a [`relay::NetworkRelay`], which
//! encodes them as envelopes for a [`relay::Transport`]. Every delivery is
//! tagged with whether it originated on this peer.

pub mod bus;
pub mod outbox;
pub mod relay;
