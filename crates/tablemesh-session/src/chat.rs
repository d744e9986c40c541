//! Chat messages: the per-tab log and the one-shot message evaluator.

use std::collections::BTreeMap;

use tablemesh_core::event::ChatMessage;
use tablemesh_core::identifier::{Identifier, PeerId};

/// Turns a chat command (typically a dice expression) into a result line.
///
/// Invoked only on the peer that sent the message, so each command is
/// evaluated once across the mesh.
pub trait MessageEvaluator: Send {
    /// Evaluates `message`; `None` means it was not a command.
    fn evaluate(&mut self, message: &ChatMessage) -> Option<String>;
}

/// What a user typed, before it becomes a [`ChatMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatDraft {
    /// The tab to post in.
    pub tab_identifier: Identifier,
    /// Display name of the speaker.
    pub name: String,
    /// The message text.
    pub text: String,
    /// Whisper recipient.
    pub to: Option<PeerId>,
    /// Dice system or other tag.
    pub tag: String,
    /// Speaker image.
    pub image_identifier: String,
}

impl ChatDraft {
    /// A public message on `tab`.
    #[must_use]
    pub fn new(tab: &str, name: &str, text: &str) -> Self {
        Self {
            tab_identifier: Identifier::from(tab),
            name: name.to_owned(),
            text: text.to_owned(),
            to: None,
            tag: String::new(),
            image_identifier: String::new(),
        }
    }

    /// Returns a copy addressed to `peer` only.
    #[must_use]
    pub fn whisper_to(mut self, peer: PeerId) -> Self {
        self.to = Some(peer);
        self
    }

    /// Returns a copy tagged with `tag`.
    #[must_use]
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = tag.to_owned();
        self
    }
}

/// Messages received by one peer, grouped by tab in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    tabs: BTreeMap<Identifier, Vec<ChatMessage>>,
}

impl ChatLog {
    /// Appends `message` to its tab. A message already logged is ignored.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        let tab = self.tabs.entry(message.tab_identifier.clone()).or_default();
        if tab.iter().any(|m| m.identifier == message.identifier) {
            return false;
        }
        tab.push(message);
        true
    }

    /// Messages of one tab.
    #[must_use]
    pub fn messages(&self, tab: &Identifier) -> &[ChatMessage] {
        self.tabs.get(tab).map(Vec::as_slice).unwrap_or_default()
    }

    /// The message answering `identifier`, if one arrived.
    #[must_use]
    pub fn response_to(&self, identifier: &Identifier) -> Option<&ChatMessage> {
        self.tabs
            .values()
            .flatten()
            .find(|m| m.response_identifier.as_ref() == Some(identifier))
    }

    /// Total number of logged messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tabs.values().map(Vec::len).sum()
    }

    /// Returns true if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, tab: &str) -> ChatMessage {
        ChatMessage {
            identifier: Identifier::from(id),
            tab_identifier: Identifier::from(tab),
            from: PeerId::from("alice"),
            to: None,
            timestamp: 0,
            tag: String::new(),
            name: "Alice".to_owned(),
            text: "hello".to_owned(),
            image_identifier: String::new(),
            response_identifier: None,
        }
    }

    #[test]
    fn test_push_groups_by_tab_and_skips_duplicates() {
        // Arrange
        let mut log = ChatLog::default();

        // Act
        let first = log.push(message("m1", "main"));
        let again = log.push(message("m1", "main"));
        log.push(message("m2", "ooc"));

        // Assert
        assert!(first);
        assert!(!again);
        assert_eq!(log.messages(&Identifier::from("main")).len(), 1);
        assert_eq!(log.messages(&Identifier::from("ooc")).len(), 1);
        assert!(log.messages(&Identifier::from("nope")).is_empty());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_response_to_finds_answer() {
        let mut log = ChatLog::default();
        let mut answer = message("m2", "main");
        answer.response_identifier = Some(Identifier::from("m1"));
        log.push(message("m1", "main"));
        log.push(answer);

        let found = log.response_to(&Identifier::from("m1"));

        assert_eq!(found.map(|m| m.identifier.as_str()), Some("m2"));
    }
}
