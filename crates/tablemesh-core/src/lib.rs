//! Tablemesh Core: shared primitives.
//!
//! This crate defines the identifiers, values, event records, and error
//! type that every other tablemesh crate depends on. It contains no
//! replication logic of its own.

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod identifier;
pub mod value;
