//! Error type shared by all tablemesh crates.

use thiserror::Error;

use crate::identifier::Identifier;

/// Top-level replication error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No live node is registered under the identifier.
    #[error("object not found: {0}")]
    ObjectNotFound(Identifier),

    /// The identifier belongs to a node that has been destroyed.
    #[error("object destroyed: {0}")]
    ObjectDestroyed(Identifier),

    /// A live node is already registered under the identifier.
    #[error("duplicate identifier: {0}")]
    DuplicateIdentifier(Identifier),

    /// Attaching the child would make a node its own ancestor.
    #[error("attaching {child} under {parent} would create a cycle")]
    HierarchyCycle {
        /// The would-be parent.
        parent: Identifier,
        /// The node being attached.
        child: Identifier,
    },

    /// The node exists but is not of the requested kind.
    #[error("object {identifier} is a {actual}, expected {expected}")]
    KindMismatch {
        /// The node that was looked up.
        identifier: Identifier,
        /// The alias name the caller asked for.
        expected: &'static str,
        /// The alias name the node actually has.
        actual: String,
    },

    /// No node kind is known under the alias name.
    #[error("unknown alias name: {0}")]
    UnknownAlias(String),

    /// An XML document could not be read.
    #[error("xml error: {0}")]
    Xml(String),

    /// An event payload did not have the expected shape.
    #[error("payload error: {0}")]
    Payload(String),

    /// The transport refused a message.
    #[error("transport error: {0}")]
    Transport(String),

    /// A configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
}
