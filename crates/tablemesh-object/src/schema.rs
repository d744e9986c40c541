//! Declared synchronized fields.
//!
//! Each node kind lists its replicated fields once, through
//! [`sync_fields!`](crate::sync_fields). The macro generates the struct,
//! its `Default`, and a [`SyncSchema`] implementation that exports the
//! fields as a JSON map (for update notices) and as text (for XML), and
//! applies them back one field at a time so that a garbled field is
//! rejected without touching the others.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tablemesh_core::value::{DataValue, format_number};
use tracing::warn;

pub use tablemesh_core::event::SyncMap;

/// Outcome of applying a field map or XML attributes to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Fields that were overwritten.
    pub applied: Vec<String>,
    /// Fields that were present but could not be decoded; their previous
    /// value was kept.
    pub rejected: Vec<String>,
}

impl ApplyReport {
    /// Returns true if no field was rejected.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Appends another report's entries to this one.
    pub fn merge(&mut self, other: ApplyReport) {
        self.applied.extend(other.applied);
        self.rejected.extend(other.rejected);
    }
}

/// Text form of a field value, as written into XML attributes.
pub trait FieldValue: Sized {
    /// Renders the value.
    fn to_text(&self) -> String;

    /// Parses the value; `None` means the text is not a valid value.
    fn from_text(text: &str) -> Option<Self>;
}

impl FieldValue for String {
    fn to_text(&self) -> String {
        self.clone()
    }

    fn from_text(text: &str) -> Option<Self> {
        Some(text.to_owned())
    }
}

impl FieldValue for f64 {
    fn to_text(&self) -> String {
        format_number(*self)
    }

    fn from_text(text: &str) -> Option<Self> {
        text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
    }
}

impl FieldValue for i64 {
    fn to_text(&self) -> String {
        self.to_string()
    }

    fn from_text(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }
}

impl FieldValue for u32 {
    fn to_text(&self) -> String {
        self.to_string()
    }

    fn from_text(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }
}

impl FieldValue for bool {
    fn to_text(&self) -> String {
        self.to_string()
    }

    fn from_text(text: &str) -> Option<Self> {
        match text.trim() {
            "true" | "1" => Some(true),
            "false" | "0" | "" => Some(false),
            _ => None,
        }
    }
}

impl FieldValue for DataValue {
    fn to_text(&self) -> String {
        DataValue::to_text(self)
    }

    fn from_text(text: &str) -> Option<Self> {
        Some(DataValue::from_text(text))
    }
}

/// A set of synchronized fields.
pub trait SyncSchema {
    /// Wire names of the declared fields, in declaration order.
    const FIELD_NAMES: &'static [&'static str];

    /// Writes every field into `map` under its wire name.
    fn write_sync_map(&self, map: &mut SyncMap);

    /// Overwrites the fields present in `map`. Fields missing from the map
    /// keep their value; undecodable fields are reported as rejected.
    fn read_sync_map(&mut self, map: &SyncMap, report: &mut ApplyReport);

    /// Appends `(wire name, text)` for every field.
    fn write_text_fields(&self, out: &mut Vec<(String, String)>);

    /// Applies one field from text. Returns `None` if the name is not a
    /// declared field, `Some(false)` if the text was rejected.
    fn read_text_field(&mut self, name: &str, text: &str) -> Option<bool>;

    /// Convenience wrapper returning a fresh map.
    fn to_sync_map(&self) -> SyncMap {
        let mut map = SyncMap::new();
        self.write_sync_map(&mut map);
        map
    }
}

#[doc(hidden)]
pub fn encode_field<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[doc(hidden)]
pub fn decode_field<T: DeserializeOwned>(
    map: &SyncMap,
    name: &str,
    slot: &mut T,
    report: &mut ApplyReport,
) {
    let Some(raw) = map.get(name) else {
        return;
    };
    match serde_json::from_value::<T>(raw.clone()) {
        Ok(value) => {
            *slot = value;
            report.applied.push(name.to_owned());
        }
        Err(e) => {
            warn!(field = name, error = %e, "rejected synchronized field");
            report.rejected.push(name.to_owned());
        }
    }
}

#[doc(hidden)]
pub fn decode_text<T: FieldValue>(name: &str, text: &str, slot: &mut T) -> bool {
    if let Some(value) = T::from_text(text) {
        *slot = value;
        true
    } else {
        warn!(field = name, text, "rejected field text");
        false
    }
}

/// Declares a struct of synchronized fields.
///
/// Every field names its type, default, and wire name:
///
/// ```
/// tablemesh_object::sync_fields! {
///     /// Where a piece sits.
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct Position {
///         /// Horizontal offset.
///         pub x: f64 = 0.0 => "location.x",
///         /// Surface name.
///         pub surface: String = "table".to_owned() => "location.name",
///     }
/// }
///
/// use tablemesh_object::schema::SyncSchema;
/// let map = Position::default().to_sync_map();
/// assert_eq!(map["location.name"], "table");
/// ```
#[macro_export]
macro_rules! sync_fields {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty = $default:expr => $wire:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl ::core::default::Default for $name {
            fn default() -> Self {
                Self {
                    $( $field: $default, )*
                }
            }
        }

        impl $crate::schema::SyncSchema for $name {
            const FIELD_NAMES: &'static [&'static str] = &[$($wire),*];

            fn write_sync_map(&self, map: &mut $crate::schema::SyncMap) {
                $(
                    map.insert(
                        ::std::string::String::from($wire),
                        $crate::schema::encode_field(&self.$field),
                    );
                )*
            }

            fn read_sync_map(
                &mut self,
                map: &$crate::schema::SyncMap,
                report: &mut $crate::schema::ApplyReport,
            ) {
                $( $crate::schema::decode_field(map, $wire, &mut self.$field, report); )*
            }

            fn write_text_fields(
                &self,
                out: &mut ::std::vec::Vec<(::std::string::String, ::std::string::String)>,
            ) {
                $(
                    out.push((
                        ::std::string::String::from($wire),
                        $crate::schema::FieldValue::to_text(&self.$field),
                    ));
                )*
            }

            fn read_text_field(&mut self, name: &str, text: &str) -> ::core::option::Option<bool> {
                match name {
                    $( $wire => ::core::option::Option::Some(
                        $crate::schema::decode_text(name, text, &mut self.$field),
                    ), )*
                    _ => ::core::option::Option::None,
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::sync_fields! {
        #[derive(Debug, Clone, PartialEq)]
        struct Sample {
            label: String = "piece".to_owned() => "label",
            count: i64 = 3 => "count",
            ratio: f64 = 0.5 => "ratio",
            visible: bool = true => "visible",
        }
    }

    #[test]
    fn test_defaults_come_from_declaration() {
        let sample = Sample::default();

        assert_eq!(sample.label, "piece");
        assert_eq!(sample.count, 3);
        assert!(sample.visible);
        assert_eq!(Sample::FIELD_NAMES, &["label", "count", "ratio", "visible"]);
    }

    #[test]
    fn test_read_sync_map_rejects_bad_field_and_keeps_the_rest() {
        // Arrange
        let mut sample = Sample::default();
        let mut map = SyncMap::new();
        map.insert("label".to_owned(), serde_json::json!("token"));
        map.insert("count".to_owned(), serde_json::json!("many"));
        map.insert("ratio".to_owned(), serde_json::json!(0.25));
        let mut report = ApplyReport::default();

        // Act
        sample.read_sync_map(&map, &mut report);

        // Assert
        assert_eq!(sample.label, "token");
        assert_eq!(sample.count, 3);
        assert!((sample.ratio - 0.25).abs() < f64::EPSILON);
        assert!(sample.visible);
        assert_eq!(report.applied, vec!["label".to_owned(), "ratio".to_owned()]);
        assert_eq!(report.rejected, vec!["count".to_owned()]);
    }

    #[test]
    fn test_text_fields_follow_declaration_order() {
        let mut out = Vec::new();

        Sample::default().write_text_fields(&mut out);

        assert_eq!(
            out,
            vec![
                ("label".to_owned(), "piece".to_owned()),
                ("count".to_owned(), "3".to_owned()),
                ("ratio".to_owned(), "0.5".to_owned()),
                ("visible".to_owned(), "true".to_owned()),
            ]
        );
    }

    #[test]
    fn test_read_text_field_distinguishes_unknown_and_rejected() {
        let mut sample = Sample::default();

        assert_eq!(sample.read_text_field("count", "7"), Some(true));
        assert_eq!(sample.read_text_field("count", "seven"), Some(false));
        assert_eq!(sample.read_text_field("colour", "red"), None);
        assert_eq!(sample.count, 7);
    }
}
