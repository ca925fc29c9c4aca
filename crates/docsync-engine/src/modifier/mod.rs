//! # Tree Modifier
//!
//! Projects a transaction onto the document tree in place. Two cursors sweep
//! the tree left to right: the remover over content of the old sequence and
//! the inserter where content of the new sequence belongs. While both sit at
//! the same position, retained content is skipped; once they part, retained
//! content is moved from the remover to the inserter, so carried-through nodes
//! keep their identity.
//!
//! Each tree mutation is applied as soon as it is decided and reported as a
//! [`TreeOperation`]. Every mutation is also described by an [`Adjustment`]
//! that rewrites both cursors, keeping them valid for the rest of the pass.

mod cursor;
mod identity;
mod operation;

pub use cursor::{Adjustment, Cursor, Position};
pub use operation::TreeOperation;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;

use identity::{Step, contains_relocation, normalize, relocations};

use crate::error::{EngineError, Result};
use crate::linear::{Item, ItemId, NodeKind, matching_close};
use crate::transaction::Transaction;
use crate::tree::{DocumentTree, NodeId};

/// What the remover is looking at
#[derive(Debug, Clone, Copy)]
enum Ahead {
    /// End of the node's children
    Close(NodeId),
    /// Characters left in the current text run
    Chars(usize),
    /// A branch child and its outer length
    Node(NodeId, usize),
}

/// Snapshot of the modifier's transient state, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierState {
    pub remover: Cursor,
    pub inserter: Cursor,
    pub adjustments: Vec<Adjustment>,
    pub inserted: BTreeSet<NodeId>,
    pub deleted: BTreeSet<NodeId>,
}

impl ModifierState {
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "remover: {}", self.remover);
        let _ = writeln!(out, "inserter: {}", self.inserter);
        for (label, set) in [("inserted", &self.inserted), ("deleted", &self.deleted)] {
            out.push_str(label);
            out.push(':');
            for id in set {
                let _ = write!(out, " {id}");
            }
            out.push('\n');
        }
        out.push_str("adjustments:\n");
        for adjustment in &self.adjustments {
            let _ = writeln!(out, "  {adjustment}");
        }
        out
    }
}

/// Result of a completed pass
#[derive(Debug, Clone)]
pub struct ModifierOutcome {
    pub operations: Vec<TreeOperation>,
    pub state: ModifierState,
}

pub struct TreeModifier<'a> {
    tree: &'a mut DocumentTree,
    steps: Vec<Step>,
    next_step: usize,
    base_length: usize,
    consumed: usize,
    relocated: HashSet<ItemId>,
    /// Relocated nodes taken out of the tree, with the path they had
    detached: BTreeMap<ItemId, (NodeId, Vec<usize>)>,
    /// Relocated nodes whose insertion came before their removal
    moved_early: HashSet<ItemId>,
    remover: Cursor,
    inserter: Cursor,
    operations: Vec<TreeOperation>,
    adjustments: Vec<Adjustment>,
    inserted: BTreeSet<NodeId>,
    deleted: BTreeSet<NodeId>,
}

/// Run a whole transaction against `tree`
pub fn apply(tree: &mut DocumentTree, transaction: &Transaction) -> Result<ModifierOutcome> {
    let mut modifier = TreeModifier::new(tree, transaction)?;
    modifier.complete()?;
    Ok(modifier.into_outcome())
}

impl<'a> TreeModifier<'a> {
    /// Prepare a pass. `tree` must mirror the transaction's old sequence.
    pub fn new(tree: &'a mut DocumentTree, transaction: &Transaction) -> Result<Self> {
        if tree.len() != transaction.base_length() {
            return Err(EngineError::divergence(format!(
                "tree holds {} items but the transaction expects {}",
                tree.len(),
                transaction.base_length()
            )));
        }
        let steps = normalize(transaction.operations());
        let relocated = relocations(&steps);
        let root = tree.root();
        Ok(Self {
            tree,
            steps,
            next_step: 0,
            base_length: transaction.base_length(),
            consumed: 0,
            relocated,
            detached: BTreeMap::new(),
            moved_early: HashSet::new(),
            remover: Cursor::at_start(root),
            inserter: Cursor::at_start(root),
            operations: Vec::new(),
            adjustments: Vec::new(),
            inserted: BTreeSet::new(),
            deleted: BTreeSet::new(),
        })
    }

    pub fn remover(&self) -> &Cursor {
        &self.remover
    }

    pub fn inserter(&self) -> &Cursor {
        &self.inserter
    }

    pub fn operations(&self) -> &[TreeOperation] {
        &self.operations
    }

    pub fn remaining_steps(&self) -> usize {
        self.steps.len() - self.next_step
    }

    pub fn state(&self) -> ModifierState {
        ModifierState {
            remover: self.remover.clone(),
            inserter: self.inserter.clone(),
            adjustments: self.adjustments.clone(),
            inserted: self.inserted.clone(),
            deleted: self.deleted.clone(),
        }
    }

    /// Process the next step, returning the tree operations it emitted.
    /// `None` once every step has run.
    pub fn step(&mut self) -> Result<Option<&[TreeOperation]>> {
        let Some(slot) = self.steps.get_mut(self.next_step) else {
            return Ok(None);
        };
        let step = std::mem::replace(slot, Step::Retain(0));
        self.next_step += 1;
        let first = self.operations.len();

        match step {
            Step::Retain(length) => {
                self.consumed += length;
                self.retain(length)?;
            }
            Step::Replace { remove, insert } => {
                self.consumed += remove.len();
                self.remove_items(&remove)?;
                self.insert_items(&insert)?;
            }
            Step::Attribute { key, to } => self.set_attribute(&key, to.as_deref())?,
        }

        Ok(Some(&self.operations[first..]))
    }

    /// Run the remaining steps and the implicit final retain, then check that
    /// both cursors reached the end of the document.
    pub fn complete(&mut self) -> Result<()> {
        while self.step()?.is_some() {}

        let tail = self.base_length.saturating_sub(self.consumed);
        if tail > 0 {
            self.consumed += tail;
            self.retain(tail)?;
        }

        for (_, (node, path)) in std::mem::take(&mut self.detached) {
            let kind = self.tree.live(node)?.kind();
            self.emit(TreeOperation::RemoveNode { path, kind, node });
            self.tree.discard(node);
            self.deleted.insert(node);
        }

        let root = self.tree.root();
        let end = Position::new(root, self.tree.children(root).len());
        for (name, cursor) in [("remover", &self.remover), ("inserter", &self.inserter)] {
            if cursor.depth() != 1 || cursor.top() != end {
                return Err(EngineError::divergence(format!(
                    "{name} ended at {cursor}, expected {end}"
                )));
            }
        }
        Ok(())
    }

    pub fn into_outcome(self) -> ModifierOutcome {
        ModifierOutcome {
            state: self.state(),
            operations: self.operations,
        }
    }

    fn emit(&mut self, operation: TreeOperation) {
        log::trace!("{operation}");
        self.operations.push(operation);
    }

    fn record(&mut self, adjustment: Adjustment) {
        self.remover.adjust(&adjustment);
        self.inserter.adjust(&adjustment);
        self.adjustments.push(adjustment);
    }

    fn normalize_cursors(&mut self) {
        self.remover.normalize(self.tree);
        self.inserter.normalize(self.tree);
    }

    fn in_sync(&self) -> bool {
        self.remover.top() == self.inserter.top()
    }

    fn path(&self, node: NodeId) -> Result<Vec<usize>> {
        self.tree
            .path_of(node)
            .ok_or_else(|| EngineError::divergence(format!("{node} is not in the tree")))
    }

    /// Path of the position's parent and the item offset inside it
    fn text_location(&self, position: Position) -> Result<(Vec<usize>, usize)> {
        let preceding: usize = self
            .tree
            .children(position.parent)
            .iter()
            .take(position.index)
            .filter_map(|child| self.tree.outer_length(*child))
            .sum();
        Ok((self.path(position.parent)?, preceding + position.offset))
    }

    fn text_child(&self, parent: NodeId, index: usize) -> Option<NodeId> {
        self.tree
            .child(parent, index)
            .filter(|id| self.tree.node(*id).is_some_and(|node| node.is_text()))
    }

    fn peek_remover(&self) -> Result<Ahead> {
        let top = self.remover.top();
        let Some(child) = self.tree.child(top.parent, top.index) else {
            return Ok(Ahead::Close(top.parent));
        };
        let node = self.tree.live(child)?;
        if node.is_text() {
            return Ok(Ahead::Chars(node.inner_length() - top.offset));
        }
        if self.inserted.contains(&child) {
            return Err(EngineError::divergence(format!(
                "remover reached {child}, which was inserted in this pass"
            )));
        }
        Ok(Ahead::Node(child, node.outer_length()))
    }

    // Primitives. Each mutates the tree, records its adjustments and leaves
    // text runs canonical.

    /// Merge the children at `index - 1` and `index` if both are text runs
    fn merge_text_at(&mut self, parent: NodeId, index: usize) -> Result<()> {
        if index == 0 {
            return Ok(());
        }
        let (Some(left), Some(right)) = (
            self.text_child(parent, index - 1),
            self.text_child(parent, index),
        ) else {
            return Ok(());
        };
        let left_length = self.tree.live(left)?.inner_length();
        let right_length = self.tree.live(right)?.inner_length();
        self.tree.detach(right)?;
        self.tree.discard(right);
        self.tree.resize_text(left, right_length as isize)?;
        self.record(Adjustment::MergeText {
            parent,
            index: index - 1,
            left_length,
        });
        Ok(())
    }

    /// Take `node` out of the tree, returning the path it had
    fn unlink(&mut self, node: NodeId) -> Result<Vec<usize>> {
        let path = self.path(node)?;
        let (parent, index) = self.tree.detach(node)?;
        self.record(Adjustment::RemoveChild { parent, index });
        self.merge_text_at(parent, index)?;
        self.normalize_cursors();
        Ok(path)
    }

    /// Make the inserter sit between children, splitting a text run if needed
    fn split_at_inserter(&mut self) -> Result<()> {
        let top = self.inserter.top();
        if top.offset == 0 {
            return Ok(());
        }
        let text = self
            .text_child(top.parent, top.index)
            .ok_or_else(|| EngineError::divergence(format!("inserter at {top} is not inside text")))?;
        let rest = self.tree.live(text)?.inner_length() - top.offset;
        self.tree.resize_text(text, -(rest as isize))?;
        let tail = self.tree.create_text(rest);
        self.tree.attach(top.parent, top.index + 1, tail)?;
        self.record(Adjustment::SplitText {
            parent: top.parent,
            index: top.index,
            offset: top.offset,
        });
        Ok(())
    }

    /// Attach a detached node at the inserter and step the inserter past it
    fn attach_at_inserter(&mut self, node: NodeId) -> Result<()> {
        self.split_at_inserter()?;
        let top = self.inserter.top();
        self.tree.attach(top.parent, top.index, node)?;
        self.record(Adjustment::InsertChild {
            parent: top.parent,
            index: top.index,
        });
        Ok(())
    }

    /// Remove characters at the remover, returning where they were
    fn remove_chars(&mut self, length: usize) -> Result<(Vec<usize>, usize)> {
        let top = self.remover.top();
        let text = self
            .text_child(top.parent, top.index)
            .ok_or_else(|| EngineError::divergence(format!("remover at {top} is not at text")))?;
        let available = self.tree.live(text)?.inner_length() - top.offset;
        if length > available {
            return Err(EngineError::divergence(format!(
                "removing {length} characters but only {available} remain at {top}"
            )));
        }
        let location = self.text_location(top)?;

        self.tree.resize_text(text, -(length as isize))?;
        self.record(Adjustment::RemoveChars {
            parent: top.parent,
            index: top.index,
            offset: top.offset,
            length,
        });
        if self.tree.live(text)?.inner_length() == 0 {
            let (parent, index) = self.tree.detach(text)?;
            self.tree.discard(text);
            self.record(Adjustment::RemoveChild { parent, index });
            self.merge_text_at(parent, index)?;
        }
        self.normalize_cursors();
        Ok(location)
    }

    /// Insert characters at the inserter, returning where they went
    fn insert_chars(&mut self, length: usize) -> Result<(Vec<usize>, usize)> {
        let top = self.inserter.top();
        let host = self.tree.live(top.parent)?.kind();
        if !host.can_contain_text() {
            return Err(EngineError::StructuralViolation(format!(
                "{host} cannot contain text"
            )));
        }
        let location = self.text_location(top)?;

        if let Some(text) = self.text_child(top.parent, top.index) {
            self.tree.resize_text(text, length as isize)?;
            self.record(Adjustment::InsertChars {
                parent: top.parent,
                index: top.index,
                offset: top.offset,
                length,
            });
        } else if let Some(text) = top.index.checked_sub(1).and_then(|i| self.text_child(top.parent, i)) {
            let end = self.tree.live(text)?.inner_length();
            self.tree.resize_text(text, length as isize)?;
            self.record(Adjustment::InsertChars {
                parent: top.parent,
                index: top.index - 1,
                offset: end,
                length,
            });
        } else {
            let text = self.tree.create_text(length);
            self.tree.attach(top.parent, top.index, text)?;
            self.record(Adjustment::InsertChild {
                parent: top.parent,
                index: top.index,
            });
        }
        self.normalize_cursors();
        Ok(location)
    }

    fn move_node(&mut self, node: NodeId) -> Result<()> {
        let kind = self.tree.live(node)?.kind();
        let from = self.unlink(node)?;
        self.attach_at_inserter(node)?;
        let to = self.path(node)?;
        self.emit(TreeOperation::MoveNode { from, to, kind, node });
        Ok(())
    }

    fn move_text(&mut self, length: usize) -> Result<()> {
        let (from, from_offset) = self.remove_chars(length)?;
        let (to, to_offset) = self.insert_chars(length)?;
        self.emit(TreeOperation::MoveText {
            from,
            from_offset,
            to,
            to_offset,
            length,
        });
        Ok(())
    }

    // Cursor transitions

    /// The remover consumes a close marker
    fn leave_remover(&mut self, expected: Option<NodeKind>) -> Result<NodeKind> {
        let Ahead::Close(node) = self.peek_remover()? else {
            return Err(EngineError::divergence(format!(
                "remover at {} is not at the end of its node",
                self.remover.top()
            )));
        };
        let kind = self.tree.live(node)?.kind();
        if expected.is_some_and(|expected| expected != kind) {
            return Err(EngineError::divergence(format!(
                "close of {} found the end of {kind}",
                expected.unwrap_or(kind)
            )));
        }
        let Some((_, removing)) = self.remover.ascend() else {
            return Err(EngineError::divergence("remover ran past the end of the document"));
        };
        if removing {
            if !self.tree.children(node).is_empty() {
                return Err(EngineError::divergence(format!(
                    "{kind} {node} lost its markers but still has children"
                )));
            }
            let path = self.unlink(node)?;
            self.emit(TreeOperation::RemoveNode { path, kind, node });
            self.tree.discard(node);
            self.deleted.insert(node);
        }
        Ok(kind)
    }

    /// The inserter closes the node it is in.
    ///
    /// Children left behind the inserter stay where they are as long as the
    /// remover is still inside that node: it reaches them later and either
    /// removes them or moves them to wherever the inserter is by then.
    fn leave_inserter(&mut self, kind: NodeKind) -> Result<()> {
        let top = self.inserter.top();
        let node_kind = self.tree.live(top.parent)?.kind();
        if node_kind != kind {
            return Err(EngineError::divergence(format!(
                "close of {kind} while the inserter is in {node_kind}"
            )));
        }
        let at_end = top.index >= self.tree.children(top.parent).len();
        if !at_end && !self.remover.is_inside(top.parent) {
            return Err(EngineError::divergence(format!(
                "inserter leaves {} with unprocessed children at {top}",
                top.parent
            )));
        }
        if self.inserter.ascend().is_none() {
            return Err(EngineError::divergence("inserter ran past the end of the document"));
        }
        Ok(())
    }

    // Step handlers

    fn retain(&mut self, mut length: usize) -> Result<()> {
        while length > 0 {
            let top = self.remover.top();
            match self.peek_remover()? {
                Ahead::Close(_) => {
                    let kind = self.leave_remover(None)?;
                    self.leave_inserter(kind)?;
                    length -= 1;
                }
                Ahead::Chars(available) => {
                    let chars = available.min(length);
                    if self.in_sync() {
                        let next = top.advanced_by(chars);
                        self.remover.set_top(next);
                        self.inserter.set_top(next);
                        self.normalize_cursors();
                    } else {
                        self.move_text(chars)?;
                    }
                    length -= chars;
                }
                Ahead::Node(node, outer) if outer <= length => {
                    if self.in_sync() {
                        self.remover.set_top(top.next_child());
                        self.inserter.set_top(top.next_child());
                    } else {
                        self.move_node(node)?;
                    }
                    length -= outer;
                }
                Ahead::Node(node, _) => {
                    // Only the open marker and part of the content are retained
                    if self.in_sync() {
                        self.remover.set_top(top.next_child());
                        self.inserter.set_top(top.next_child());
                    } else {
                        self.move_node(node)?;
                    }
                    self.remover.descend(node, false);
                    self.inserter.descend(node, false);
                    length -= 1;
                }
            }
        }
        Ok(())
    }

    fn remove_items(&mut self, items: &[Item]) -> Result<()> {
        let mut at = 0;
        while at < items.len() {
            match &items[at] {
                Item::Open { id, kind, .. } => {
                    let segment_end = matching_close(items, at);
                    if self.moved_early.contains(id) {
                        if let Some(end) = segment_end {
                            at = end + 1;
                            continue;
                        }
                    }

                    let Ahead::Node(node, _) = self.peek_remover()? else {
                        return Err(EngineError::divergence(format!(
                            "expected {kind} at {}",
                            self.remover.top()
                        )));
                    };
                    let found = self.tree.live(node)?;
                    if found.item() != Some(*id) || found.kind() != *kind {
                        return Err(EngineError::divergence(format!(
                            "expected {kind} at {}, found {} {node}",
                            self.remover.top(),
                            found.kind()
                        )));
                    }

                    match segment_end {
                        Some(end) if self.relocated.contains(id) => {
                            let path = self.unlink(node)?;
                            self.detached.insert(*id, (node, path));
                            at = end + 1;
                        }
                        Some(end) if !contains_relocation(&items[at..=end], &self.relocated) => {
                            let path = self.unlink(node)?;
                            self.emit(TreeOperation::RemoveNode {
                                path,
                                kind: *kind,
                                node,
                            });
                            self.tree.discard(node);
                            self.deleted.insert(node);
                            at = end + 1;
                        }
                        _ => {
                            let top = self.remover.top();
                            self.remover.set_top(top.next_child());
                            self.remover.descend(node, true);
                            at += 1;
                        }
                    }
                }
                Item::Close { kind, .. } => {
                    self.leave_remover(Some(*kind))?;
                    at += 1;
                }
                Item::Char { .. } => {
                    let run = items[at..].iter().take_while(|item| item.is_char()).count();
                    let mut left = run;
                    while left > 0 {
                        let Ahead::Chars(available) = self.peek_remover()? else {
                            return Err(EngineError::divergence(format!(
                                "expected text at {}",
                                self.remover.top()
                            )));
                        };
                        let length = available.min(left);
                        let (path, offset) = self.remove_chars(length)?;
                        self.emit(TreeOperation::RemoveText {
                            path,
                            offset,
                            length,
                        });
                        left -= length;
                    }
                    at += run;
                }
            }
        }
        Ok(())
    }

    fn insert_items(&mut self, items: &[Item]) -> Result<()> {
        let mut at = 0;
        while at < items.len() {
            match &items[at] {
                Item::Open {
                    id,
                    kind,
                    attributes,
                } => {
                    if let Some(end) = matching_close(items, at) {
                        if self.relocated.contains(id) {
                            self.relocate(*id, *kind)?;
                            at = end + 1;
                            continue;
                        }
                    }

                    let host = self.tree.live(self.inserter.top().parent)?.kind();
                    if !host.can_contain(*kind) {
                        return Err(EngineError::StructuralViolation(format!(
                            "{host} cannot contain {kind}"
                        )));
                    }
                    let node = self.tree.create_branch(*kind, *id, attributes.clone());
                    self.attach_at_inserter(node)?;
                    let path = self.path(node)?;
                    self.emit(TreeOperation::InsertNode {
                        path,
                        kind: *kind,
                        node,
                    });
                    self.inserted.insert(node);
                    self.inserter.descend(node, false);
                    at += 1;
                }
                Item::Close { kind, .. } => {
                    self.leave_inserter(*kind)?;
                    at += 1;
                }
                Item::Char { .. } => {
                    let length = items[at..].iter().take_while(|item| item.is_char()).count();
                    let (path, offset) = self.insert_chars(length)?;
                    self.emit(TreeOperation::InsertText {
                        path,
                        offset,
                        length,
                    });
                    at += length;
                }
            }
        }
        Ok(())
    }

    /// Put a relocated node at the inserter, taking it from where it still is
    /// if its removal has not been reached yet
    fn relocate(&mut self, id: ItemId, kind: NodeKind) -> Result<()> {
        let (node, from) = match self.detached.remove(&id) {
            Some(detached) => detached,
            None => {
                let node = self
                    .tree
                    .find_by_item(id)
                    .filter(|node| self.tree.parent(*node).is_some())
                    .ok_or_else(|| EngineError::divergence(format!("relocated {kind} is not in the tree")))?;
                let from = self.unlink(node)?;
                self.moved_early.insert(id);
                (node, from)
            }
        };
        self.attach_at_inserter(node)?;
        let to = self.path(node)?;
        self.emit(TreeOperation::MoveNode { from, to, kind, node });
        Ok(())
    }

    fn set_attribute(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        let Ahead::Node(node, _) = self.peek_remover()? else {
            return Err(EngineError::divergence(format!(
                "attribute change at {} does not precede an element",
                self.remover.top()
            )));
        };
        self.tree.set_attribute(node, key, value)
    }
}
