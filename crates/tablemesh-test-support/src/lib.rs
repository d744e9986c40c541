//! Shared test transports and utilities for tablemesh.

mod clock;
mod transport;

pub use clock::FixedClock;
pub use transport::{FailingTransport, LoopbackMesh, LoopbackTransport, RecordingTransport};
