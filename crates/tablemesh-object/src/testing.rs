//! Minimal node kind for unit tests.

use crate::data_element::{DATA_ELEMENT_ALIAS, DataElement};
use crate::kind::NodeKind;
use crate::schema::{ApplyReport, SyncMap, SyncSchema};

crate::sync_fields! {
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct TokenFields {
        pub(crate) label: String = String::new() => "label",
        pub(crate) x: f64 = 0.0 => "location.x",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TestKind {
    Token(TokenFields, u32),
    Data(DataElement),
}

impl TestKind {
    pub(crate) fn token(label: &str) -> Self {
        Self::Token(
            TokenFields {
                label: label.to_owned(),
                ..TokenFields::default()
            },
            0,
        )
    }

    pub(crate) fn refresh_count(&self) -> u32 {
        match self {
            Self::Token(_, count) => *count,
            Self::Data(_) => 0,
        }
    }
}

impl NodeKind for TestKind {
    fn alias_name(&self) -> &'static str {
        match self {
            Self::Token(..) => "token",
            Self::Data(_) => DATA_ELEMENT_ALIAS,
        }
    }

    fn instantiate(alias_name: &str) -> Option<Self> {
        match alias_name {
            "token" => Some(Self::Token(TokenFields::default(), 0)),
            DATA_ELEMENT_ALIAS => Some(Self::Data(DataElement::default())),
            _ => None,
        }
    }

    fn sync_fields(&self) -> SyncMap {
        match self {
            Self::Token(fields, _) => fields.to_sync_map(),
            Self::Data(element) => element.to_sync_map(),
        }
    }

    fn apply_sync_fields(&mut self, fields: &SyncMap) -> ApplyReport {
        let mut report = ApplyReport::default();
        match self {
            Self::Token(own, _) => own.read_sync_map(fields, &mut report),
            Self::Data(element) => element.read_sync_map(fields, &mut report),
        }
        report
    }

    fn xml_attributes(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        match self {
            Self::Token(fields, _) => fields.write_text_fields(&mut out),
            Self::Data(element) => element.write_text_fields(&mut out),
        }
        out
    }

    fn apply_xml_attribute(&mut self, name: &str, text: &str) -> Option<bool> {
        match self {
            Self::Token(fields, _) => fields.read_text_field(name, text),
            Self::Data(element) => element.read_text_field(name, text),
        }
    }

    fn xml_text(&self) -> Option<String> {
        self.as_data_element().map(|element| element.value.to_text())
    }

    fn apply_xml_text(&mut self, text: &str) {
        if let Some(element) = self.as_data_element_mut() {
            element.apply_xml_text(text);
        }
    }

    fn refresh(&mut self) {
        if let Self::Token(_, count) = self {
            *count += 1;
        }
    }

    fn as_data_element(&self) -> Option<&DataElement> {
        match self {
            Self::Data(element) => Some(element),
            Self::Token(..) => None,
        }
    }

    fn as_data_element_mut(&mut self) -> Option<&mut DataElement> {
        match self {
            Self::Data(element) => Some(element),
            Self::Token(..) => None,
        }
    }

    fn from_data_element(element: DataElement) -> Self {
        Self::Data(element)
    }
}
