//! Cursor positions and the adjustments that keep them valid.
//!
//! A [`Position`] is a value: every change to the tree is described by an
//! [`Adjustment`], and [`Position::adjusted`] computes where a position ends
//! up afterwards. The modifier applies each adjustment to every frame of both
//! cursors right after the mutation it describes.

use std::fmt;

use crate::tree::{DocumentTree, NodeId};

/// A gap between children of `parent`, or a point inside the text run at
/// `index` when `offset` is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub parent: NodeId,
    pub index: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(parent: NodeId, index: usize) -> Self {
        Self {
            parent,
            index,
            offset: 0,
        }
    }

    /// Past the child this position is in front of
    pub fn next_child(self) -> Self {
        Self::new(self.parent, self.index + 1)
    }

    /// Further into the text run at `index`
    pub fn advanced_by(self, chars: usize) -> Self {
        Self {
            offset: self.offset + chars,
            ..self
        }
    }

    /// Where this position ends up after `adjustment`
    pub fn adjusted(self, adjustment: &Adjustment) -> Self {
        let Self {
            parent,
            index,
            offset,
        } = self;
        if parent != adjustment.parent() {
            return self;
        }
        match *adjustment {
            Adjustment::InsertChild { index: at, .. } => {
                if index >= at {
                    Self::new(parent, index + 1).advanced_by(offset)
                } else {
                    self
                }
            }
            Adjustment::RemoveChild { index: at, .. } => {
                if index > at {
                    Self { index: index - 1, ..self }
                } else if index == at {
                    Self::new(parent, index)
                } else {
                    self
                }
            }
            Adjustment::InsertChars {
                index: at,
                offset: from,
                length,
                ..
            } => {
                if index == at && offset >= from {
                    self.advanced_by(length)
                } else {
                    self
                }
            }
            Adjustment::RemoveChars {
                index: at,
                offset: from,
                length,
                ..
            } => {
                if index != at || offset <= from {
                    self
                } else if offset >= from + length {
                    Self { offset: offset - length, ..self }
                } else {
                    Self { offset: from, ..self }
                }
            }
            Adjustment::SplitText { index: at, offset: split, .. } => {
                if index > at {
                    Self { index: index + 1, ..self }
                } else if index == at && offset >= split {
                    Self::new(parent, index + 1).advanced_by(offset - split)
                } else {
                    self
                }
            }
            Adjustment::MergeText {
                index: at,
                left_length,
                ..
            } => {
                if index == at + 1 {
                    Self::new(parent, at).advanced_by(left_length + offset)
                } else if index > at + 1 {
                    Self { index: index - 1, ..self }
                } else {
                    self
                }
            }
        }
    }

    /// Moves a position sitting at the very end of a text run to the next gap
    pub(crate) fn normalized(self, tree: &DocumentTree) -> Self {
        if self.offset == 0 {
            return self;
        }
        match tree.child(self.parent, self.index).and_then(|id| tree.node(id)) {
            Some(node) if node.is_text() && self.offset >= node.inner_length() => self.next_child(),
            _ => self,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.parent, self.index)?;
        if self.offset > 0 {
            write!(f, "+{}", self.offset)?;
        }
        Ok(())
    }
}

/// A single structural change, in the coordinates it was made in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    InsertChild {
        parent: NodeId,
        index: usize,
    },
    RemoveChild {
        parent: NodeId,
        index: usize,
    },
    InsertChars {
        parent: NodeId,
        index: usize,
        offset: usize,
        length: usize,
    },
    RemoveChars {
        parent: NodeId,
        index: usize,
        offset: usize,
        length: usize,
    },
    /// The text run at `index` now ends at `offset`; the rest follows at `index + 1`
    SplitText {
        parent: NodeId,
        index: usize,
        offset: usize,
    },
    /// The text run at `index + 1` was appended to the one at `index`
    MergeText {
        parent: NodeId,
        index: usize,
        left_length: usize,
    },
}

impl Adjustment {
    pub fn parent(&self) -> NodeId {
        match *self {
            Adjustment::InsertChild { parent, .. }
            | Adjustment::RemoveChild { parent, .. }
            | Adjustment::InsertChars { parent, .. }
            | Adjustment::RemoveChars { parent, .. }
            | Adjustment::SplitText { parent, .. }
            | Adjustment::MergeText { parent, .. } => parent,
        }
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::InsertChild { parent, index } => write!(f, "insertChild {parent}:{index}"),
            Adjustment::RemoveChild { parent, index } => write!(f, "removeChild {parent}:{index}"),
            Adjustment::InsertChars {
                parent,
                index,
                offset,
                length,
            } => write!(f, "insertChars {parent}:{index}+{offset} ({length})"),
            Adjustment::RemoveChars {
                parent,
                index,
                offset,
                length,
            } => write!(f, "removeChars {parent}:{index}+{offset} ({length})"),
            Adjustment::SplitText {
                parent,
                index,
                offset,
            } => write!(f, "splitText {parent}:{index}+{offset}"),
            Adjustment::MergeText {
                parent,
                index,
                left_length,
            } => write!(f, "mergeText {parent}:{index} ({left_length})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frame {
    position: Position,
    /// The open marker of `position.parent` was removed; the node goes when
    /// the cursor leaves it.
    removing: bool,
}

/// A stack of positions. The top is live; each frame below is where the
/// cursor resumes after leaving the node it descended into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    frames: Vec<Frame>,
}

impl Cursor {
    pub fn at_start(root: NodeId) -> Self {
        Self {
            frames: vec![Frame {
                position: Position::new(root, 0),
                removing: false,
            }],
        }
    }

    pub fn top(&self) -> Position {
        self.frames
            .last()
            .map(|frame| frame.position)
            .unwrap_or_else(|| Position::new(NodeId(0), 0))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether the node the cursor is in lost its open marker
    pub fn is_removing(&self) -> bool {
        self.frames.last().is_some_and(|frame| frame.removing)
    }

    /// Whether any frame sits directly inside `node`
    pub fn is_inside(&self, node: NodeId) -> bool {
        self.frames.iter().any(|frame| frame.position.parent == node)
    }

    pub(crate) fn set_top(&mut self, position: Position) {
        if let Some(frame) = self.frames.last_mut() {
            frame.position = position;
        }
    }

    /// Enter `node` at its first child, keeping the current top as the resume point
    pub(crate) fn descend(&mut self, node: NodeId, removing: bool) {
        self.frames.push(Frame {
            position: Position::new(node, 0),
            removing,
        });
    }

    /// Leave the current node. Returns the node left and whether it was removing.
    pub(crate) fn ascend(&mut self) -> Option<(NodeId, bool)> {
        if self.frames.len() < 2 {
            return None;
        }
        self.frames
            .pop()
            .map(|frame| (frame.position.parent, frame.removing))
    }

    pub(crate) fn adjust(&mut self, adjustment: &Adjustment) {
        for frame in &mut self.frames {
            frame.position = frame.position.adjusted(adjustment);
        }
    }

    pub(crate) fn normalize(&mut self, tree: &DocumentTree) {
        for frame in &mut self.frames {
            frame.position = frame.position.normalized(tree);
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, frame) in self.frames.iter().enumerate() {
            if depth > 0 {
                f.write_str(" > ")?;
            }
            write!(f, "{}", frame.position)?;
            if frame.removing {
                f.write_str("!")?;
            }
        }
        Ok(())
    }
}
