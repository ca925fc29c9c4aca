//! Compact tag notation for linear data.
//!
//! `<div><p>foo<image/></p></div>` reads as the items of a div holding a
//! paragraph with three characters and an image. Used by tests, benches and
//! the diagnostic dump. Attributes and annotations are not represented.

use crate::error::{EngineError, Result};

use super::{Item, NodeKind};

/// Short tag used when rendering a kind
pub fn markup_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Paragraph => "p",
        NodeKind::Heading => "h",
        NodeKind::Preformatted => "pre",
        other => other.name(),
    }
}

fn kind_from_tag(tag: &str) -> Option<NodeKind> {
    let kind = match tag {
        "div" => NodeKind::Div,
        "list" => NodeKind::List,
        "listItem" | "li" => NodeKind::ListItem,
        "blockQuote" => NodeKind::BlockQuote,
        "p" | "paragraph" => NodeKind::Paragraph,
        "h" | "heading" => NodeKind::Heading,
        "pre" | "preformatted" => NodeKind::Preformatted,
        "image" | "img" => NodeKind::Image,
        "break" | "br" => NodeKind::Break,
        _ => return None,
    };
    Some(kind)
}

/// Parse tag notation into fresh items. Balance is not checked here.
pub fn parse_markup(source: &str) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((at, ch)) = chars.next() {
        if ch != '<' {
            items.push(Item::char(ch));
            continue;
        }

        let mut tag = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
            if c == '>' {
                closed = true;
                break;
            }
            tag.push(c);
        }
        if !closed {
            return Err(EngineError::malformed_document(at, "unterminated tag"));
        }

        let (name, closing, self_closing) = if let Some(name) = tag.strip_prefix('/') {
            (name, true, false)
        } else if let Some(name) = tag.strip_suffix('/') {
            (name, false, true)
        } else {
            (tag.as_str(), false, false)
        };

        let kind = kind_from_tag(name.trim())
            .ok_or_else(|| EngineError::malformed_document(at, format!("unknown tag <{tag}>")))?;

        if self_closing {
            items.extend(Item::leaf(kind));
        } else if closing {
            items.push(Item::close(kind));
        } else {
            items.push(Item::open(kind));
        }
    }

    Ok(items)
}

/// Render items back to tag notation
pub fn to_markup(items: &[Item]) -> String {
    let mut out = String::new();
    for item in items {
        match item {
            Item::Open { kind, .. } => {
                out.push('<');
                out.push_str(markup_name(*kind));
                out.push('>');
            }
            Item::Close { kind, .. } => {
                out.push_str("</");
                out.push_str(markup_name(*kind));
                out.push('>');
            }
            Item::Char { ch, .. } => out.push(*ch),
        }
    }
    out
}
