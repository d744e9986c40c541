//! Chat palettes: canned chat lines with `{placeholder}` substitution.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tablemesh_object::schema::{ApplyReport, SyncMap, SyncSchema};
use tracing::debug;

/// Alias name of chat palette nodes.
pub const CHAT_PALETTE_ALIAS: &str = "chat-palette";

/// Evaluation stops growing the text past this many bytes.
pub const MAX_EVALUATED_LEN: usize = 64 * 1024;

static VARIABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^//([^=]+)=(.*)$").expect("valid palette variable regex"));
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\s*([^{}]*?)\s*\}").expect("valid placeholder regex"));

tablemesh_object::sync_fields! {
    /// Replicated state of a chat palette.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ChatPaletteFields {
        /// Dice system the palette's lines are written for.
        pub dicebot: String = String::new() => "dicebot",
        /// The raw palette text.
        pub value: String = String::new() => "value",
    }
}

/// Resolves placeholder names the palette itself does not define.
pub trait PlaceholderSource {
    /// Text for `name`, or `None` if unknown.
    fn lookup(&self, name: &str) -> Option<String>;
}

impl PlaceholderSource for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// A chat palette: its replicated text plus the lines and variables parsed
/// from it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatPalette {
    fields: ChatPaletteFields,
    lines: Vec<String>,
    variables: BTreeMap<String, String>,
}

impl ChatPalette {
    /// Creates a palette from its text.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut palette = Self::default();
        palette.set_text(text);
        palette
    }

    /// The replicated fields.
    #[must_use]
    pub fn fields(&self) -> &ChatPaletteFields {
        &self.fields
    }

    /// The raw palette text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.fields.value
    }

    /// Replaces the text and re-parses it.
    pub fn set_text(&mut self, text: &str) {
        text.clone_into(&mut self.fields.value);
        self.parse();
    }

    /// The dice system name.
    #[must_use]
    pub fn dicebot(&self) -> &str {
        &self.fields.dicebot
    }

    /// Sets the dice system name.
    pub fn set_dicebot(&mut self, dicebot: &str) {
        dicebot.clone_into(&mut self.fields.dicebot);
    }

    /// Non-empty lines that are not variable definitions, in text order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Variables defined with `//name=value`; later definitions win.
    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Re-parses lines and variables from the current text.
    pub fn parse(&mut self) {
        self.lines.clear();
        self.variables.clear();
        for line in self.fields.value.lines() {
            if let Some(caps) = VARIABLE_RE.captures(line) {
                self.variables
                    .insert(caps[1].trim().to_owned(), caps[2].trim().to_owned());
            } else if !line.trim().is_empty() {
                self.lines.push(line.to_owned());
            }
        }
    }

    /// Substitutes `{name}` placeholders in `line`: palette variables
    /// first, then `extend`. Repeats until a pass changes nothing, the text
    /// outgrows [`MAX_EVALUATED_LEN`], or `limit` passes have run.
    /// Placeholders that resolve to nothing are left as written.
    #[must_use]
    pub fn evaluate(&self, line: &str, extend: Option<&dyn PlaceholderSource>, limit: usize) -> String {
        let mut text = line.to_owned();
        for pass in 0..limit {
            let next = PLACEHOLDER_RE.replace_all(&text, |caps: &Captures<'_>| {
                let name = &caps[1];
                self.variables
                    .get(name)
                    .cloned()
                    .or_else(|| extend.and_then(|source| source.lookup(name)))
                    .unwrap_or_else(|| caps[0].to_owned())
            });
            if next == text {
                return text;
            }
            if next.len() > MAX_EVALUATED_LEN {
                debug!(pass, "palette evaluation stopped growing");
                return text;
            }
            text = next.into_owned();
        }
        debug!(limit, "palette evaluation hit the pass limit");
        text
    }
}

impl SyncSchema for ChatPalette {
    const FIELD_NAMES: &'static [&'static str] = ChatPaletteFields::FIELD_NAMES;

    fn write_sync_map(&self, map: &mut SyncMap) {
        self.fields.write_sync_map(map);
    }

    fn read_sync_map(&mut self, map: &SyncMap, report: &mut ApplyReport) {
        self.fields.read_sync_map(map, report);
        self.parse();
    }

    fn write_text_fields(&self, out: &mut Vec<(String, String)>) {
        out.push(("dicebot".to_owned(), self.fields.dicebot.clone()));
    }

    fn read_text_field(&mut self, name: &str, text: &str) -> Option<bool> {
        match name {
            "dicebot" => self.fields.read_text_field(name, text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use tablemesh_core::config::DEFAULT_PLACEHOLDER_ITERATION_LIMIT;

    use super::*;

    #[test]
    fn test_parse_separates_lines_and_variables() {
        let palette = ChatPalette::new("2d6+{str}\n//str=5\n\n  \nCC<={SAN}\n// dex = 12 ");

        assert_eq!(palette.lines(), &["2d6+{str}".to_owned(), "CC<={SAN}".to_owned()]);
        assert_eq!(palette.variables().get("str").map(String::as_str), Some("5"));
        assert_eq!(palette.variables().get("dex").map(String::as_str), Some("12"));
    }

    #[test]
    fn test_evaluate_substitutes_palette_variable() {
        // Arrange
        let palette = ChatPalette::new("2d6+{str}\n//str=5");

        // Act
        let result = palette.evaluate("2d6+{str}", None, DEFAULT_PLACEHOLDER_ITERATION_LIMIT);

        // Assert
        assert_eq!(result, "2d6+5");
    }

    #[test]
    fn test_evaluate_resolves_nested_variables_and_falls_back_to_extend() {
        let palette = ChatPalette::new("//atk={base}+{bonus}\n//base=1d20");
        let mut extend = BTreeMap::new();
        extend.insert("bonus".to_owned(), "3".to_owned());

        let result = palette.evaluate("{atk} vs { AC }", Some(&extend), 16);

        assert_eq!(result, "1d20+3 vs { AC }");
    }

    #[test]
    fn test_palette_variables_shadow_extend() {
        let palette = ChatPalette::new("//HP=99");
        let mut extend = BTreeMap::new();
        extend.insert("HP".to_owned(), "7".to_owned());

        assert_eq!(palette.evaluate("{HP}", Some(&extend), 8), "99");
    }

    #[test]
    fn test_self_referential_variable_terminates() {
        let palette = ChatPalette::new("//A={A}");

        let result = palette.evaluate("{A}", None, DEFAULT_PLACEHOLDER_ITERATION_LIMIT);

        assert_eq!(result, "{A}");
    }

    #[test]
    fn test_mutually_recursive_variables_stop_at_limit() {
        let palette = ChatPalette::new("//A=x{B}\n//B=y{A}");

        let result = palette.evaluate("{A}", None, 4);

        assert_eq!(result, "xyxy{A}");
    }

    #[test]
    fn test_doubling_variable_stops_growing() {
        let palette = ChatPalette::new("//A={A}{A}");

        let result = palette.evaluate("{A}", None, DEFAULT_PLACEHOLDER_ITERATION_LIMIT);

        assert!(result.len() <= MAX_EVALUATED_LEN);
    }

    #[test]
    fn test_remote_fields_reparse_palette() {
        let mut palette = ChatPalette::default();
        let mut map = SyncMap::new();
        map.insert("value".to_owned(), serde_json::json!("//str=8\nhit"));
        let mut report = ApplyReport::default();

        palette.read_sync_map(&map, &mut report);

        assert_eq!(palette.lines(), &["hit".to_owned()]);
        assert_eq!(palette.evaluate("{str}", None, 4), "8");
    }
}
