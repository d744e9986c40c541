//! Nested attributed-tag serialization of node subtrees.
//!
//! Each node becomes an element named by its alias, with its fields as
//! attributes in declaration order. Data element values are written as
//! text content ahead of any child elements; numbers carry a
//! `valueType="number"` marker and padded text next to children goes into
//! a CDATA section, so values read back exactly. Identifiers are not
//! serialized: a parsed document yields a fresh, unregistered [`NodeTree`].

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use tablemesh_core::error::SyncError;
use tablemesh_core::identifier::Identifier;
use tracing::warn;

use crate::kind::NodeKind;
use crate::node::{Node, NodeTree};
use crate::store::ObjectStore;

impl<K: NodeKind> ObjectStore<K> {
    /// Serializes the live subtree under `identifier`.
    #[must_use]
    pub fn to_xml(&self, identifier: &Identifier) -> Option<String> {
        self.get(identifier)?;
        let mut out = String::new();
        self.write_live(&mut out, identifier);
        Some(out)
    }

    fn write_live(&self, out: &mut String, identifier: &Identifier) {
        let Some(node) = self.get(identifier) else {
            return;
        };
        write_element(out, node.kind(), !node.children().is_empty(), |out| {
            for child in node.children() {
                self.write_live(out, child);
            }
        });
    }
}

/// Serializes a detached tree.
#[must_use]
pub fn tree_to_xml<K: NodeKind>(tree: &NodeTree<K>) -> String {
    let mut out = String::new();
    write_tree(&mut out, tree);
    out
}

fn write_tree<K: NodeKind>(out: &mut String, tree: &NodeTree<K>) {
    write_element(out, tree.node.kind(), !tree.children.is_empty(), |out| {
        for child in &tree.children {
            write_tree(out, child);
        }
    });
}

fn write_element<K: NodeKind>(
    out: &mut String,
    kind: &K,
    has_children: bool,
    write_children: impl FnOnce(&mut String),
) {
    let tag = kind.alias_name();
    out.push('<');
    out.push_str(tag);
    for (name, value) in kind.xml_attributes() {
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&escape_attribute(&value));
        out.push('"');
    }
    let text = kind.xml_text().filter(|text| !text.is_empty());
    if text.is_none() && !has_children {
        out.push_str("/>");
        return;
    }
    out.push('>');
    if let Some(text) = text {
        if has_children && text.trim() != text {
            push_cdata(out, &text);
        } else {
            out.push_str(&escape(text.as_str()));
        }
    }
    write_children(out);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn push_cdata(out: &mut String, text: &str) {
    out.push_str("<![CDATA[");
    out.push_str(&text.replace("]]>", "]]]]><![CDATA[>"));
    out.push_str("]]>");
}

fn escape_attribute(value: &str) -> String {
    escape(value)
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
        .replace('\t', "&#9;")
}

struct TextSegment {
    text: String,
    cdata: bool,
}

struct OpenElement<K> {
    tree: NodeTree<K>,
    text: Vec<TextSegment>,
}

impl<K> OpenElement<K> {
    fn new(tree: NodeTree<K>) -> Self {
        Self { tree, text: Vec::new() }
    }
}

/// Parses a document with a single root element into a detached tree.
///
/// Unknown attributes are skipped and attributes with unreadable values
/// keep the field default; both are logged. Leaf text is kept verbatim.
/// For elements with children only the text ahead of the first child
/// counts: CDATA sections and non-blank text are kept verbatim, and
/// indentation alone reads as no value.
///
/// # Errors
///
/// Returns `SyncError::UnknownAlias` for a tag no node kind is registered
/// under, and `SyncError::Xml` for malformed documents, documents without
/// a root element, or documents with more than one.
pub fn parse_xml<K: NodeKind>(xml: &str) -> Result<NodeTree<K>, SyncError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<OpenElement<K>> = Vec::new();
    let mut root: Option<NodeTree<K>> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SyncError::Xml(format!("at {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(start) => {
                stack.push(OpenElement::new(open_element::<K>(&start)?));
            }
            Event::Empty(start) => {
                let open = OpenElement::new(open_element::<K>(&start)?);
                close_element(open, &mut stack, &mut root)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| SyncError::Xml(e.to_string()))?;
                push_text(&mut stack, &text, false)?;
            }
            Event::CData(data) => {
                let bytes = data.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&bytes), true)?;
            }
            Event::End(_) => {
                let Some(open) = stack.pop() else {
                    return Err(SyncError::Xml("unexpected closing tag".to_owned()));
                };
                close_element(open, &mut stack, &mut root)?;
            }
            Event::Eof => break,
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(SyncError::Xml("unclosed element at end of document".to_owned()));
    }
    root.ok_or_else(|| SyncError::Xml("document has no root element".to_owned()))
}

fn open_element<K: NodeKind>(start: &BytesStart<'_>) -> Result<NodeTree<K>, SyncError> {
    let tag = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| SyncError::Xml(e.to_string()))?
        .to_owned();
    let mut kind = K::instantiate(&tag).ok_or(SyncError::UnknownAlias(tag.clone()))?;

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| SyncError::Xml(e.to_string()))?;
        let name = std::str::from_utf8(attribute.key.as_ref())
            .map_err(|e| SyncError::Xml(e.to_string()))?;
        let value = attribute
            .unescape_value()
            .map_err(|e| SyncError::Xml(e.to_string()))?;
        if kind.apply_xml_attribute(name, &value).is_none() {
            warn!(tag = %tag, attribute = name, "skipped unknown attribute");
        }
    }
    Ok(NodeTree::new(Node::new(kind)))
}

fn push_text<K>(stack: &mut [OpenElement<K>], text: &str, cdata: bool) -> Result<(), SyncError> {
    let blank = !cdata && text.trim().is_empty();
    match stack.last_mut() {
        Some(open) if open.tree.children.is_empty() => {
            open.text.push(TextSegment {
                text: text.to_owned(),
                cdata,
            });
            Ok(())
        }
        Some(_) => {
            if !blank {
                warn!(text, "skipped text after a child element");
            }
            Ok(())
        }
        None if blank => Ok(()),
        None => Err(SyncError::Xml("text outside the root element".to_owned())),
    }
}

fn element_text<K>(open: &OpenElement<K>) -> String {
    if open.tree.children.is_empty() {
        return open.text.iter().map(|segment| segment.text.as_str()).collect();
    }
    if open.text.iter().any(|segment| segment.cdata) {
        return open
            .text
            .iter()
            .filter(|segment| segment.cdata || !segment.text.trim().is_empty())
            .map(|segment| segment.text.as_str())
            .collect();
    }
    let joined: String = open.text.iter().map(|segment| segment.text.as_str()).collect();
    joined.trim().to_owned()
}

fn close_element<K: NodeKind>(
    open: OpenElement<K>,
    stack: &mut [OpenElement<K>],
    root: &mut Option<NodeTree<K>>,
) -> Result<(), SyncError> {
    let text = element_text(&open);
    let mut tree = open.tree;
    tree.node.kind_mut().apply_xml_text(&text);
    tree.node.kind_mut().refresh();

    match stack.last_mut() {
        Some(parent) => parent.tree.push_child(tree),
        None if root.is_none() => *root = Some(tree),
        None => return Err(SyncError::Xml("more than one root element".to_owned())),
    }
    Ok(())
}
