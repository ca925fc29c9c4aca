use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::NodeKind;

/// Stable identity of a single item.
///
/// Assigned when the item is created and carried unchanged when a transaction
/// moves the item somewhere else. Two items that merely look alike have
/// different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference to an annotation (bold, a link target, ...) applied to characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationRef(pub String);

impl AnnotationRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

pub type Attributes = BTreeMap<String, String>;

/// One atomic unit of linear data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Item {
    Open {
        id: ItemId,
        kind: NodeKind,
        attributes: Attributes,
    },
    Close {
        id: ItemId,
        kind: NodeKind,
    },
    Char {
        id: ItemId,
        ch: char,
        /// Ordered, without duplicates
        annotations: Vec<AnnotationRef>,
    },
}

impl Item {
    pub fn open(kind: NodeKind) -> Self {
        Self::open_with(kind, Attributes::new())
    }

    pub fn open_with(kind: NodeKind, attributes: Attributes) -> Self {
        Item::Open {
            id: ItemId::new(),
            kind,
            attributes,
        }
    }

    pub fn close(kind: NodeKind) -> Self {
        Item::Close {
            id: ItemId::new(),
            kind,
        }
    }

    pub fn char(ch: char) -> Self {
        Item::Char {
            id: ItemId::new(),
            ch,
            annotations: Vec::new(),
        }
    }

    /// Fresh character items for `text`
    pub fn text(text: &str) -> Vec<Item> {
        text.chars().map(Item::char).collect()
    }

    /// An inline leaf element: its open and close marker
    pub fn leaf(kind: NodeKind) -> [Item; 2] {
        [Item::open(kind), Item::close(kind)]
    }

    pub fn id(&self) -> ItemId {
        match self {
            Item::Open { id, .. } | Item::Close { id, .. } | Item::Char { id, .. } => *id,
        }
    }

    /// Kind of the marker, `None` for characters
    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            Item::Open { kind, .. } | Item::Close { kind, .. } => Some(*kind),
            Item::Char { .. } => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Item::Open { .. })
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Item::Close { .. })
    }

    pub fn is_char(&self) -> bool {
        matches!(self, Item::Char { .. })
    }

    pub fn as_char(&self) -> Option<char> {
        match self {
            Item::Char { ch, .. } => Some(*ch),
            _ => None,
        }
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Item::Open { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn annotations(&self) -> &[AnnotationRef] {
        match self {
            Item::Char { annotations, .. } => annotations,
            _ => &[],
        }
    }

    /// Copy of this open marker with one attribute changed (`None` removes it)
    pub(crate) fn with_attribute(&self, key: &str, value: Option<&str>) -> Item {
        let mut item = self.clone();
        if let Item::Open { attributes, .. } = &mut item {
            match value {
                Some(value) => {
                    attributes.insert(key.to_string(), value.to_string());
                }
                None => {
                    attributes.remove(key);
                }
            }
        }
        item
    }

    /// Copy of this character with `annotation` added or removed
    pub(crate) fn with_annotation(&self, annotation: &AnnotationRef, set: bool) -> Item {
        let mut item = self.clone();
        if let Item::Char { annotations, .. } = &mut item {
            if set {
                if !annotations.contains(annotation) {
                    annotations.push(annotation.clone());
                }
            } else {
                annotations.retain(|a| a != annotation);
            }
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let items = Item::text("aaaa");
        let mut ids: Vec<_> = items.iter().map(Item::id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_clone_keeps_identity_but_fresh_item_does_not() {
        let a = Item::char('x');
        let copy = a.clone();
        let lookalike = Item::char('x');

        assert_eq!(a, copy);
        assert_ne!(a, lookalike);
        assert_eq!(a.as_char(), lookalike.as_char());
    }

    #[test]
    fn test_with_attribute_sets_and_removes() {
        let open = Item::open(NodeKind::Heading);
        let set = open.with_attribute("level", Some("2"));
        assert_eq!(set.attributes().unwrap().get("level").map(String::as_str), Some("2"));
        assert_eq!(set.id(), open.id());

        let removed = set.with_attribute("level", None);
        assert!(removed.attributes().unwrap().is_empty());
    }

    #[test]
    fn test_with_annotation_keeps_set_semantics() {
        let bold = AnnotationRef::new("textStyle/bold");
        let ch = Item::char('a').with_annotation(&bold, true);
        let twice = ch.with_annotation(&bold, true);
        assert_eq!(twice.annotations(), &[bold.clone()]);

        let cleared = twice.with_annotation(&bold, false);
        assert!(cleared.annotations().is_empty());
    }

    #[test]
    fn test_close_marker_accessors() {
        let item = Item::close(NodeKind::ListItem);
        assert_eq!(item.kind(), Some(NodeKind::ListItem));
        assert!(item.is_close());
        assert!(item.attributes().is_none());
        assert!(item.annotations().is_empty());
    }
}
