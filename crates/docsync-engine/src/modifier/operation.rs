use std::fmt;

use serde::Serialize;

use crate::linear::NodeKind;
use crate::tree::NodeId;

/// One mutation the tree modifier applied to the tree.
///
/// Operations are listed in the order they were applied, and each path is
/// valid in the tree as it was at that moment. Text operations address their
/// content branch and an item offset inside it, so they stay meaningful when
/// text runs are split or merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeOperation {
    /// `path` is where the new node now sits
    InsertNode {
        path: Vec<usize>,
        kind: NodeKind,
        #[serde(skip)]
        node: NodeId,
    },
    /// `path` is where the node sat before removal
    RemoveNode {
        path: Vec<usize>,
        kind: NodeKind,
        #[serde(skip)]
        node: NodeId,
    },
    MoveNode {
        from: Vec<usize>,
        to: Vec<usize>,
        kind: NodeKind,
        #[serde(skip)]
        node: NodeId,
    },
    InsertText {
        path: Vec<usize>,
        offset: usize,
        length: usize,
    },
    RemoveText {
        path: Vec<usize>,
        offset: usize,
        length: usize,
    },
    MoveText {
        from: Vec<usize>,
        from_offset: usize,
        to: Vec<usize>,
        to_offset: usize,
        length: usize,
    },
}

impl TreeOperation {
    pub fn name(&self) -> &'static str {
        match self {
            TreeOperation::InsertNode { .. } => "insertNode",
            TreeOperation::RemoveNode { .. } => "removeNode",
            TreeOperation::MoveNode { .. } => "moveNode",
            TreeOperation::InsertText { .. } => "insertText",
            TreeOperation::RemoveText { .. } => "removeText",
            TreeOperation::MoveText { .. } => "moveText",
        }
    }

    /// The node this operation inserted, removed or moved
    pub fn node(&self) -> Option<NodeId> {
        match self {
            TreeOperation::InsertNode { node, .. }
            | TreeOperation::RemoveNode { node, .. }
            | TreeOperation::MoveNode { node, .. } => Some(*node),
            _ => None,
        }
    }
}

struct Path<'a>(&'a [usize]);

impl fmt::Display for Path<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/")?;
        let parts: Vec<String> = self.0.iter().map(usize::to_string).collect();
        f.write_str(&parts.join("/"))
    }
}

impl fmt::Display for TreeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeOperation::InsertNode { path, kind, .. } | TreeOperation::RemoveNode { path, kind, .. } => {
                write!(f, "{} {} at {}", self.name(), kind, Path(path))
            }
            TreeOperation::MoveNode { from, to, kind, .. } => {
                write!(f, "moveNode {} {} -> {}", kind, Path(from), Path(to))
            }
            TreeOperation::InsertText { path, offset, length }
            | TreeOperation::RemoveText { path, offset, length } => {
                write!(f, "{} {} at {}+{}", self.name(), length, Path(path), offset)
            }
            TreeOperation::MoveText {
                from,
                from_offset,
                to,
                to_offset,
                length,
            } => write!(
                f,
                "moveText {} {}+{} -> {}+{}",
                length,
                Path(from),
                from_offset,
                Path(to),
                to_offset
            ),
        }
    }
}
