//! Tablemesh Tabletop: the domain object variants.
//!
//! [`kind::TabletopKind`] is the closed set of node kinds a tabletop session
//! stores. Each variant has a factory that seeds its `image`, `common` and
//! `detail` data element sections, and a handle type that reads and writes
//! those sections through the store, creating missing elements on first
//! read.

pub mod character;
pub mod chat_palette;
pub mod fields;
pub mod image;
pub mod kind;
pub mod object;
pub mod piece;
pub mod terrain;
pub mod text_note;
