//! # Document Tree
//!
//! The hierarchical mirror of the linear data. Nodes live in an arena and are
//! addressed by [`NodeId`]. Each node stores only its own length; offsets are
//! derived by summing preceding siblings and ancestor markers, so an edit never
//! invalidates cached positions elsewhere in the tree.
//!
//! [`DocumentTree::build`] is the ground truth: the incremental tree modifier
//! must always leave a tree for which [`DocumentTree::same_structure`] holds
//! against a fresh build of the same linear data.

mod node;

pub use node::{Node, NodeId};

use std::fmt::Write as _;

use crate::error::{EngineError, Result};
use crate::linear::{Attributes, Item, ItemId, LinearData, NodeKind};
use crate::transaction::LinearRange;

/// Arena-backed document tree.
///
/// Removing a node leaves a tombstone in its slot so every other [`NodeId`]
/// stays valid across incremental commits. Slots are only reclaimed when the
/// tree is built afresh, e.g. by `Document::rebuild_tree`; callers holding a
/// tree for a long editing session should rebuild once
/// [`DocumentTree::tombstones`] outgrows the live node count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTree {
    nodes: Vec<Option<Node>>,
    root: NodeId,
}

/// Open branch on the build stack
struct Frame {
    id: NodeId,
    node: Node,
    pending_text: usize,
}

impl Frame {
    fn flush_text(&mut self, nodes: &mut Vec<Option<Node>>) {
        if self.pending_text == 0 {
            return;
        }
        let mut text = Node::text(self.pending_text);
        text.parent = Some(self.id);
        let text_id = NodeId(nodes.len());
        nodes.push(Some(text));
        self.node.children.push(text_id);
        self.node.length += self.pending_text;
        self.pending_text = 0;
    }
}

fn close_frame(nodes: &mut [Option<Node>], stack: &mut Vec<Frame>, mut frame: Frame) {
    if let Some(parent) = stack.last_mut() {
        frame.node.parent = Some(parent.id);
        parent.node.length += frame.node.outer_length();
        parent.node.children.push(frame.id);
    }
    nodes[frame.id.0] = Some(frame.node);
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self {
            nodes: vec![Some(Node::branch(
                NodeKind::Document,
                None,
                Attributes::new(),
            ))],
            root: NodeId(0),
        }
    }
}

impl DocumentTree {
    /// Build a fresh tree from linear data in one pass.
    ///
    /// Opens push a branch onto a stack, closes pop it into its parent, and
    /// consecutive characters collapse into a single text run.
    pub fn build(data: &LinearData) -> Self {
        let mut nodes: Vec<Option<Node>> = vec![None];
        let mut stack = vec![Frame {
            id: NodeId(0),
            node: Node::branch(NodeKind::Document, None, Attributes::new()),
            pending_text: 0,
        }];

        for item in data.items() {
            match item {
                Item::Char { .. } => {
                    if let Some(top) = stack.last_mut() {
                        top.pending_text += 1;
                    }
                }
                Item::Open {
                    id,
                    kind,
                    attributes,
                } => {
                    if let Some(top) = stack.last_mut() {
                        top.flush_text(&mut nodes);
                    }
                    let node_id = NodeId(nodes.len());
                    nodes.push(None);
                    stack.push(Frame {
                        id: node_id,
                        node: Node::branch(*kind, Some(*id), attributes.clone()),
                        pending_text: 0,
                    });
                }
                Item::Close { .. } => {
                    // The root frame is only closed once the input is exhausted
                    if stack.len() > 1 {
                        if let Some(mut frame) = stack.pop() {
                            frame.flush_text(&mut nodes);
                            close_frame(&mut nodes, &mut stack, frame);
                        }
                    }
                }
            }
        }

        while let Some(mut frame) = stack.pop() {
            frame.flush_text(&mut nodes);
            close_frame(&mut nodes, &mut stack, frame);
        }

        Self {
            nodes,
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).map(Node::kind)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(Node::children).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    pub fn outer_length(&self, id: NodeId) -> Option<usize> {
        self.node(id).map(Node::outer_length)
    }

    pub fn inner_length(&self, id: NodeId) -> Option<usize> {
        self.node(id).map(Node::inner_length)
    }

    /// Length of the whole document in items
    pub fn len(&self) -> usize {
        self.inner_length(self.root).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Arena slots freed by removed nodes and not yet reclaimed
    pub fn tombstones(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_none()).count()
    }

    /// Nodes currently reachable through the arena, root included
    pub fn live_nodes(&self) -> usize {
        self.nodes.len() - self.tombstones()
    }

    /// Index of `id` among its parent's children
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    /// Linear offset where the node starts (its open marker, or first character)
    pub fn offset_of(&self, id: NodeId) -> Option<usize> {
        self.node(id)?;
        let mut offset = 0;
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            for sibling in self.children(parent) {
                if *sibling == current {
                    break;
                }
                offset += self.outer_length(*sibling)?;
            }
            if parent != self.root {
                offset += 1;
            }
            current = parent;
        }
        (current == self.root).then_some(offset)
    }

    /// Linear offset of the node's first inner item
    pub fn inner_offset_of(&self, id: NodeId) -> Option<usize> {
        let offset = self.offset_of(id)?;
        let node = self.node(id)?;
        let markers = node.outer_length() - node.inner_length();
        Some(offset + markers / 2)
    }

    /// Child indices leading from the root to `id`
    pub fn path_of(&self, id: NodeId) -> Option<Vec<usize>> {
        self.node(id)?;
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            path.push(self.index_in_parent(current)?);
            current = parent;
        }
        if current != self.root {
            return None;
        }
        path.reverse();
        Some(path)
    }

    /// Node reached by following child indices from the root
    pub fn node_at_path(&self, path: &[usize]) -> Option<NodeId> {
        let mut current = self.root;
        for index in path {
            current = *self.children(current).get(*index)?;
        }
        Some(current)
    }

    /// Deepest branch whose inner range contains `offset`
    pub fn node_at_offset(&self, offset: usize) -> Option<NodeId> {
        if offset > self.len() {
            return None;
        }
        let mut current = self.root;
        let mut inner_start = 0;
        'descend: loop {
            let mut cursor = inner_start;
            for child in self.children(current) {
                let node = self.node(*child)?;
                let outer = node.outer_length();
                if !node.is_text() && cursor < offset && offset < cursor + outer {
                    current = *child;
                    inner_start = cursor + 1;
                    continue 'descend;
                }
                cursor += outer;
            }
            return Some(current);
        }
    }

    /// Content branches overlapping `range`, grouped into runs of consecutive siblings
    pub fn covered_sibling_groups(&self, range: impl Into<LinearRange>) -> Vec<Vec<NodeId>> {
        let range = range.into();
        let mut covered = Vec::new();
        self.collect_content_branches(self.root, 0, range.start(), range.end(), &mut covered);

        let mut groups: Vec<Vec<NodeId>> = Vec::new();
        for id in covered {
            let continues = groups.last().and_then(|group| group.last()).is_some_and(|previous| {
                self.parent(*previous) == self.parent(id)
                    && self.index_in_parent(*previous).map(|index| index + 1) == self.index_in_parent(id)
            });
            match groups.last_mut() {
                Some(group) if continues => group.push(id),
                _ => groups.push(vec![id]),
            }
        }
        groups
    }

    fn collect_content_branches(
        &self,
        id: NodeId,
        inner_start: usize,
        from: usize,
        to: usize,
        out: &mut Vec<NodeId>,
    ) {
        let mut cursor = inner_start;
        for child in self.children(id) {
            let Some(node) = self.node(*child) else {
                continue;
            };
            let outer = node.outer_length();
            let (inner_from, inner_to) = (cursor + 1, (cursor + outer).saturating_sub(1));
            if !node.is_text() && inner_from <= to && from <= inner_to {
                if node.kind.is_content_branch() {
                    out.push(*child);
                } else if node.kind.is_structural() {
                    self.collect_content_branches(*child, inner_from, from, to, out);
                }
            }
            cursor += outer;
        }
    }

    /// Live or detached branch built from the open marker `item`
    pub fn find_by_item(&self, item: ItemId) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|node| node.item == Some(item)))
            .map(NodeId)
    }

    /// Nodes below `id` in document order, `id` first
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// Path of the first node where the two trees differ, ignoring arena handles
    pub fn first_difference(&self, other: &DocumentTree) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        if self.same_subtree(self.root, other, other.root, &mut path) {
            None
        } else {
            Some(path)
        }
    }

    /// Same kinds, identities, attributes, lengths and nesting at every depth
    pub fn same_structure(&self, other: &DocumentTree) -> bool {
        self.first_difference(other).is_none()
    }

    fn same_subtree(&self, a: NodeId, other: &DocumentTree, b: NodeId, path: &mut Vec<usize>) -> bool {
        let (Some(left), Some(right)) = (self.node(a), other.node(b)) else {
            return false;
        };
        if left.kind != right.kind
            || left.item != right.item
            || left.attributes != right.attributes
            || left.length != right.length
            || left.children.len() != right.children.len()
        {
            return false;
        }
        for (index, (x, y)) in left.children.iter().zip(&right.children).enumerate() {
            path.push(index);
            if !self.same_subtree(*x, other, *y, path) {
                return false;
            }
            path.pop();
        }
        true
    }

    /// One line per node, indented by depth
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(self.root, 0, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        let _ = write!(out, "{:indent$}{} {} [{}]", "", node.kind, id, node.length, indent = depth * 2);
        if !node.attributes.is_empty() {
            let attributes: Vec<String> = node
                .attributes
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            let _ = write!(out, " {{{}}}", attributes.join(", "));
        }
        out.push('\n');
        for child in &node.children {
            self.dump_node(*child, depth + 1, out);
        }
    }

    // Low-level mutation used by the tree modifier. Each keeps lengths up to
    // date along the ancestor chain but does not normalize text runs.

    pub(crate) fn live(&self, id: NodeId) -> Result<&Node> {
        self.node(id)
            .ok_or_else(|| EngineError::divergence(format!("{id} is not a live node")))
    }

    fn live_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| EngineError::divergence(format!("{id} is not a live node")))
    }

    pub(crate) fn child(&self, parent: NodeId, index: usize) -> Option<NodeId> {
        self.children(parent).get(index).copied()
    }

    pub(crate) fn create_branch(&mut self, kind: NodeKind, item: ItemId, attributes: Attributes) -> NodeId {
        self.nodes.push(Some(Node::branch(kind, Some(item), attributes)));
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn create_text(&mut self, length: usize) -> NodeId {
        self.nodes.push(Some(Node::text(length)));
        NodeId(self.nodes.len() - 1)
    }

    fn propagate(&mut self, from: Option<NodeId>, delta: isize) -> Result<()> {
        let mut current = from;
        while let Some(id) = current {
            let node = self.live_mut(id)?;
            node.length = node
                .length
                .checked_add_signed(delta)
                .ok_or_else(|| EngineError::divergence(format!("length of {id} underflows")))?;
            current = node.parent;
        }
        Ok(())
    }

    pub(crate) fn attach(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        let outer = {
            let node = self.live_mut(child)?;
            if node.parent.is_some() {
                return Err(EngineError::divergence(format!("{child} is already attached")));
            }
            node.parent = Some(parent);
            node.outer_length()
        };
        let host = self.live_mut(parent)?;
        if index > host.children.len() {
            return Err(EngineError::divergence(format!(
                "child index {index} is past the end of {parent}"
            )));
        }
        host.children.insert(index, child);
        self.propagate(Some(parent), outer as isize)
    }

    /// Unlink `child` from its parent, returning where it was
    pub(crate) fn detach(&mut self, child: NodeId) -> Result<(NodeId, usize)> {
        let (parent, outer) = {
            let node = self.live_mut(child)?;
            let parent = node
                .parent
                .take()
                .ok_or_else(|| EngineError::divergence(format!("{child} is not attached")))?;
            (parent, node.outer_length())
        };
        let host = self.live_mut(parent)?;
        let index = host
            .children
            .iter()
            .position(|id| *id == child)
            .ok_or_else(|| EngineError::divergence(format!("{child} is missing from {parent}")))?;
        host.children.remove(index);
        self.propagate(Some(parent), -(outer as isize))?;
        Ok((parent, index))
    }

    /// Free a detached subtree
    pub(crate) fn discard(&mut self, id: NodeId) {
        for node in self.descendants(id) {
            if let Some(slot) = self.nodes.get_mut(node.0) {
                *slot = None;
            }
        }
    }

    /// Grow or shrink a text run
    pub(crate) fn resize_text(&mut self, text: NodeId, delta: isize) -> Result<()> {
        if !self.live(text)?.is_text() {
            return Err(EngineError::divergence(format!("{text} is not a text run")));
        }
        self.propagate(Some(text), delta)
    }

    pub(crate) fn set_attribute(&mut self, id: NodeId, key: &str, value: Option<&str>) -> Result<()> {
        let node = self.live_mut(id)?;
        match value {
            Some(value) => {
                node.attributes.insert(key.to_string(), value.to_string());
            }
            None => {
                node.attributes.remove(key);
            }
        }
        Ok(())
    }
}
