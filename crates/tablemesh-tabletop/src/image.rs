//! Image references and markdown image rewriting.

use std::collections::HashMap;
use std::ops::Range;

use pulldown_cmark::{Event, LinkType, Parser, Tag};
use tracing::debug;

/// Maps image identifiers to displayable URLs.
pub trait ImageUrlResolver {
    /// URL of the image stored under `identifier`, if known.
    fn resolve(&self, identifier: &str) -> Option<String>;
}

/// An in-memory image catalogue.
#[derive(Debug, Clone, Default)]
pub struct ImageCatalog {
    urls: HashMap<String, String>,
}

impl ImageCatalog {
    /// Creates an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, identifier: impl Into<String>, url: impl Into<String>) {
        self.urls.insert(identifier.into(), url.into());
    }
}

impl ImageUrlResolver for ImageCatalog {
    fn resolve(&self, identifier: &str) -> Option<String> {
        self.urls.get(identifier).cloned()
    }
}

/// Rewrites the destination of every inline markdown image whose
/// destination the resolver knows. Reference-style images, images inside
/// code, and unknown destinations are left untouched.
#[must_use]
pub fn rewrite_markdown_images(markdown: &str, resolver: &dyn ImageUrlResolver) -> String {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for (event, range) in Parser::new(markdown).into_offset_iter() {
        let Event::Start(Tag::Image {
            link_type: LinkType::Inline,
            dest_url,
            ..
        }) = event
        else {
            continue;
        };
        let Some(url) = resolver.resolve(&dest_url) else {
            continue;
        };
        match destination_span(&markdown[range.clone()]) {
            Some(span) => edits.push((range.start + span.start..range.start + span.end, url)),
            None => debug!(destination = %dest_url, "could not locate image destination"),
        }
    }

    let mut out = markdown.to_owned();
    for (span, url) in edits.into_iter().rev() {
        out.replace_range(span, &url);
    }
    out
}

/// Locates the raw destination inside `![alt](destination "title")`,
/// without angle brackets.
fn destination_span(source: &str) -> Option<Range<usize>> {
    let open = alt_text_end(source)? + 2;
    if source.get(open - 1..open) != Some("(") {
        return None;
    }
    let rest = &source[open..];
    let start = open + (rest.len() - rest.trim_start().len());
    if source[start..].starts_with('<') {
        let end = scan(&source[start + 1..], |c| c == '>')?;
        return Some(start + 1..start + 1 + end);
    }
    let mut depth = 0usize;
    let end = scan(&source[start..], |c| match c {
        '(' => {
            depth += 1;
            false
        }
        ')' if depth == 0 => true,
        ')' => {
            depth -= 1;
            false
        }
        c => c.is_whitespace(),
    })?;
    (end > 0).then(|| start..start + end)
}

/// Byte offset of the `]` closing the alt text of `![alt]`.
fn alt_text_end(source: &str) -> Option<usize> {
    let mut depth = 0usize;
    scan(source.strip_prefix('!')?, |c| match c {
        '[' => {
            depth += 1;
            false
        }
        ']' => {
            depth = depth.saturating_sub(1);
            depth == 0
        }
        _ => false,
    })
    .map(|at| at + 1)
}

/// Offset of the first unescaped character matching `stop`.
fn scan(text: &str, mut stop: impl FnMut(char) -> bool) -> Option<usize> {
    let mut escaped = false;
    for (at, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if stop(c) {
            return Some(at);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ImageCatalog {
        let mut catalog = ImageCatalog::new();
        catalog.insert("img-1", "https://cdn.example/img-1.png");
        catalog
    }

    #[test]
    fn test_rewrites_known_inline_image() {
        // Arrange
        let text = "Look: ![map](img-1) and ![other](img-2 \"t\")";

        // Act
        let result = rewrite_markdown_images(text, &catalog());

        // Assert
        assert_eq!(
            result,
            "Look: ![map](https://cdn.example/img-1.png) and ![other](img-2 \"t\")"
        );
    }

    #[test]
    fn test_keeps_title_and_angle_brackets() {
        let result = rewrite_markdown_images("![a](<img-1> \"title\")", &catalog());

        assert_eq!(result, "![a](<https://cdn.example/img-1.png> \"title\")");
    }

    #[test]
    fn test_leaves_code_spans_and_references_alone() {
        let text = "`![a](img-1)`\n\n![b][ref]\n\n[ref]: img-1\n";

        let result = rewrite_markdown_images(text, &catalog());

        assert_eq!(result, text);
    }

    #[test]
    fn test_title_with_brackets_and_escaped_destination_are_rewritten() {
        // Arrange
        let text = "![a [b]](img\\-1 \"see ](x)\")";

        // Act
        let result = rewrite_markdown_images(text, &catalog());

        // Assert
        assert_eq!(result, "![a [b]](https://cdn.example/img-1.png \"see ](x)\")");
    }

    #[test]
    fn test_destination_span_skips_balanced_parentheses() {
        let source = "![a](img-(1) \"t\")";

        let span = destination_span(source).unwrap();

        assert_eq!(&source[span], "img-(1)");
    }

    #[test]
    fn test_rewrites_every_occurrence() {
        let result = rewrite_markdown_images("![a](img-1)\n\n![b](img-1)", &catalog());

        assert_eq!(result.matches("https://cdn.example/img-1.png").count(), 2);
    }
}
