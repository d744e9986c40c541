//! Per-peer configuration.

use std::time::Duration;

use crate::error::SyncError;
use crate::identifier::PeerId;

/// Default delay before coalesced local updates are broadcast.
pub const DEFAULT_UPDATE_THROTTLE: Duration = Duration::from_millis(50);

/// Default number of substitution passes a chat palette may make.
pub const DEFAULT_PLACEHOLDER_ITERATION_LIMIT: usize = 128;

/// Default bound on follow-up events queued by handlers during one dispatch.
pub const DEFAULT_MAX_EVENT_ROUNDS: usize = 64;

/// Settings for one peer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshConfig {
    /// This peer's identity in the mesh.
    pub peer_id: PeerId,
    /// How long local updates are coalesced before being broadcast.
    /// Zero broadcasts every `update()` immediately.
    pub update_throttle: Duration,
    /// Substitution passes allowed when evaluating palette placeholders.
    pub placeholder_iteration_limit: usize,
    /// Follow-up event rounds allowed per dispatch.
    pub max_event_rounds: usize,
}

impl MeshConfig {
    /// Creates a configuration with default settings for the given peer.
    #[must_use]
    pub fn for_peer(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            update_throttle: DEFAULT_UPDATE_THROTTLE,
            placeholder_iteration_limit: DEFAULT_PLACEHOLDER_ITERATION_LIMIT,
            max_event_rounds: DEFAULT_MAX_EVENT_ROUNDS,
        }
    }

    /// Returns a copy with the update throttle replaced.
    #[must_use]
    pub fn with_update_throttle(mut self, throttle: Duration) -> Self {
        self.update_throttle = throttle;
        self
    }

    /// Reads the configuration from `TABLEMESH_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Configuration` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Configuration` if a value is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let peer_id = match lookup("TABLEMESH_PEER_ID") {
            Some(value) if !value.trim().is_empty() => PeerId::from(value.trim()),
            Some(_) => {
                return Err(SyncError::Configuration(
                    "TABLEMESH_PEER_ID must not be empty".into(),
                ));
            }
            None => PeerId::generate(),
        };
        let mut config = Self::for_peer(peer_id);

        if let Some(value) = lookup("TABLEMESH_UPDATE_THROTTLE_MS") {
            let millis: u64 = parse_number("TABLEMESH_UPDATE_THROTTLE_MS", &value)?;
            config.update_throttle = Duration::from_millis(millis);
        }
        if let Some(value) = lookup("TABLEMESH_PLACEHOLDER_LIMIT") {
            config.placeholder_iteration_limit = parse_number("TABLEMESH_PLACEHOLDER_LIMIT", &value)?;
        }
        if let Some(value) = lookup("TABLEMESH_MAX_EVENT_ROUNDS") {
            config.max_event_rounds = parse_number("TABLEMESH_MAX_EVENT_ROUNDS", &value)?;
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SyncError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SyncError::Configuration(format!("{key} must be a non-negative integer: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_uses_defaults_when_unset() {
        // Act
        let config = MeshConfig::from_lookup(lookup_from(&[])).unwrap();

        // Assert
        assert_eq!(config.update_throttle, DEFAULT_UPDATE_THROTTLE);
        assert_eq!(
            config.placeholder_iteration_limit,
            DEFAULT_PLACEHOLDER_ITERATION_LIMIT
        );
        assert!(!config.peer_id.as_str().is_empty());
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        // Arrange
        let lookup = lookup_from(&[
            ("TABLEMESH_PEER_ID", "alice"),
            ("TABLEMESH_UPDATE_THROTTLE_MS", "0"),
            ("TABLEMESH_PLACEHOLDER_LIMIT", "8"),
        ]);

        // Act
        let config = MeshConfig::from_lookup(lookup).unwrap();

        // Assert
        assert_eq!(config.peer_id, PeerId::from("alice"));
        assert_eq!(config.update_throttle, Duration::ZERO);
        assert_eq!(config.placeholder_iteration_limit, 8);
    }

    #[test]
    fn test_from_lookup_rejects_garbage_throttle() {
        // Arrange
        let lookup = lookup_from(&[("TABLEMESH_UPDATE_THROTTLE_MS", "soon")]);

        // Act
        let result = MeshConfig::from_lookup(lookup);

        // Assert
        match result {
            Err(SyncError::Configuration(msg)) => {
                assert!(msg.contains("TABLEMESH_UPDATE_THROTTLE_MS"));
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
    }
}
