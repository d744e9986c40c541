//! Tagged value carried by data elements.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The value of a data element: a number, a string, or nothing.
///
/// On the JSON wire `Empty` is `null`, `Number` a JSON number and `Text` a
/// JSON string. XML documents mark numeric element text explicitly; free
/// standing attribute text goes through [`DataValue::from_text`], which
/// yields a number only for the canonical rendering of that number, so
/// `"007"` stays text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    /// No value.
    #[default]
    Empty,
    /// A finite number.
    Number(f64),
    /// Free text. Never empty; empty text is [`DataValue::Empty`].
    Text(String),
}

impl DataValue {
    /// Builds a text value, collapsing the empty string to `Empty`.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }

    /// Parses the textual form used by XML documents.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        if text.is_empty() {
            return Self::Empty;
        }
        match text.parse::<f64>() {
            Ok(number) if number.is_finite() && format_number(number) == text => {
                Self::Number(number)
            }
            _ => Self::Text(text.to_owned()),
        }
    }

    /// Renders the value as text; `Empty` renders as the empty string.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Number(number) => format_number(*number),
            Self::Text(text) => text.clone(),
        }
    }

    /// Returns true for `Empty`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Interprets the value as a number. Text is parsed leniently.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Empty => None,
            Self::Number(number) => Some(*number),
            Self::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

/// Shortest text that parses back to the same number (`5`, not `5.0`).
#[must_use]
pub fn format_number(number: f64) -> String {
    number.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_recognises_canonical_numbers() {
        assert_eq!(DataValue::from_text("5"), DataValue::Number(5.0));
        assert_eq!(DataValue::from_text("-1.5"), DataValue::Number(-1.5));
        assert_eq!(DataValue::from_text(""), DataValue::Empty);
    }

    #[test]
    fn test_from_text_keeps_non_canonical_numbers_as_text() {
        assert_eq!(DataValue::from_text("007"), DataValue::Text("007".to_owned()));
        assert_eq!(DataValue::from_text("1e3"), DataValue::Text("1e3".to_owned()));
        assert_eq!(DataValue::from_text("NaN"), DataValue::Text("NaN".to_owned()));
    }

    #[test]
    fn test_json_shapes_follow_variant() {
        assert_eq!(serde_json::to_value(DataValue::Empty).unwrap(), serde_json::Value::Null);
        assert_eq!(
            serde_json::to_value(DataValue::Number(3.0)).unwrap(),
            serde_json::json!(3.0)
        );
        assert_eq!(
            serde_json::from_value::<DataValue>(serde_json::json!("abc")).unwrap(),
            DataValue::Text("abc".to_owned())
        );
        assert_eq!(
            serde_json::from_value::<DataValue>(serde_json::Value::Null).unwrap(),
            DataValue::Empty
        );
    }

    #[test]
    fn test_text_constructor_collapses_empty_string() {
        assert_eq!(DataValue::text(""), DataValue::Empty);
    }
}
