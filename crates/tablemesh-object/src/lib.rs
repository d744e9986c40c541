//! Tablemesh Object: the replicated node model.
//!
//! [`store::ObjectStore`] is both the arena that owns every live node and
//! the identifier registry that resolves identifiers to nodes. Nodes refer
//! to their parent and children by identifier only; every structural change
//! goes through the store, which keeps the forest invariant and records the
//! changes a session must broadcast.

pub mod data_element;
pub mod kind;
pub mod node;
pub mod schema;
pub mod store;
pub mod xml;

#[cfg(test)]
pub(crate) mod testing;
