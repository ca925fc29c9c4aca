use std::fmt;

use crate::linear::{Attributes, ItemId, NodeKind};

/// Handle of a node inside one `DocumentTree`'s arena.
///
/// Handles are never reused within a tree, so a handle held across commits
/// either still names the same node or names nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub(crate) kind: NodeKind,
    /// Open marker this branch was built from. `None` for the root and text runs.
    pub(crate) item: Option<ItemId>,
    pub(crate) attributes: Attributes,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    /// Characters for a text run, inner length for a branch
    pub(crate) length: usize,
}

impl Node {
    pub(crate) fn branch(kind: NodeKind, item: Option<ItemId>, attributes: Attributes) -> Self {
        Self {
            kind,
            item,
            attributes,
            children: Vec::new(),
            parent: None,
            length: 0,
        }
    }

    pub(crate) fn text(length: usize) -> Self {
        Self {
            kind: NodeKind::Text,
            item: None,
            attributes: Attributes::new(),
            children: Vec::new(),
            parent: None,
            length,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn item(&self) -> Option<ItemId> {
        self.item
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }

    /// Items between the node's markers (all of a text run's characters)
    pub fn inner_length(&self) -> usize {
        self.length
    }

    /// Items the node occupies in linear data, markers included
    pub fn outer_length(&self) -> usize {
        match self.kind {
            NodeKind::Text | NodeKind::Document => self.length,
            _ => self.length + 2,
        }
    }
}
