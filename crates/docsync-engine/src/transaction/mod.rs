//! # Transactions
//!
//! A transaction describes an edit as a diff over the linear sequence. Its
//! operations walk the old sequence left to right; every old item is consumed
//! exactly once (by a retain, a removal or an annotation) and every new item
//! is produced exactly once.
//!
//! Transactions are values: building, reversing or translating through one
//! never touches a document. `Document::commit` is the only place they take
//! effect.

mod builder;
mod range;

pub use builder::TransactionBuilder;
pub use range::LinearRange;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::linear::{AnnotationRef, Item};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnotationAction {
    Set,
    Clear,
}

impl AnnotationAction {
    pub fn inverse(self) -> Self {
        match self {
            AnnotationAction::Set => AnnotationAction::Clear,
            AnnotationAction::Clear => AnnotationAction::Set,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Operation {
    /// Copy `length` items unchanged
    Retain { length: usize },
    /// Remove `remove` (which must match the live items) and put `insert` in its place
    Replace { remove: Vec<Item>, insert: Vec<Item> },
    /// Change one attribute of the open marker at the current offset.
    /// Consumes nothing; the following operation must retain the marker.
    Attribute {
        key: String,
        from: Option<String>,
        to: Option<String>,
    },
    /// Set or clear an annotation on the characters among the next `length` items
    Annotate {
        action: AnnotationAction,
        annotation: AnnotationRef,
        length: usize,
    },
}

impl Operation {
    /// Items of the old sequence this operation consumes
    pub fn old_length(&self) -> usize {
        match self {
            Operation::Retain { length } | Operation::Annotate { length, .. } => *length,
            Operation::Replace { remove, .. } => remove.len(),
            Operation::Attribute { .. } => 0,
        }
    }

    /// Items of the new sequence this operation produces
    pub fn new_length(&self) -> usize {
        match self {
            Operation::Retain { length } | Operation::Annotate { length, .. } => *length,
            Operation::Replace { insert, .. } => insert.len(),
            Operation::Attribute { .. } => 0,
        }
    }

    pub fn reversed(&self) -> Operation {
        match self {
            Operation::Retain { length } => Operation::Retain { length: *length },
            Operation::Replace { remove, insert } => Operation::Replace {
                remove: insert.clone(),
                insert: remove.clone(),
            },
            Operation::Attribute { key, from, to } => Operation::Attribute {
                key: key.clone(),
                from: to.clone(),
                to: from.clone(),
            },
            Operation::Annotate {
                action,
                annotation,
                length,
            } => Operation::Annotate {
                action: action.inverse(),
                annotation: annotation.clone(),
                length: *length,
            },
        }
    }
}

/// An ordered, validated list of operations over a sequence of `base_length` items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    operations: Vec<Operation>,
    base_length: usize,
}

impl Transaction {
    /// Validate `operations` against a base sequence of `base_length` items
    pub fn new(base_length: usize, operations: Vec<Operation>) -> Result<Self> {
        for (index, op) in operations.iter().enumerate() {
            match op {
                Operation::Retain { length: 0 } => {
                    return Err(EngineError::MalformedTransaction(format!(
                        "operation {index} retains nothing"
                    )));
                }
                Operation::Replace { remove, insert } if remove.is_empty() && insert.is_empty() => {
                    return Err(EngineError::MalformedTransaction(format!(
                        "operation {index} replaces nothing with nothing"
                    )));
                }
                Operation::Annotate { length: 0, .. } => {
                    return Err(EngineError::MalformedTransaction(format!(
                        "operation {index} annotates nothing"
                    )));
                }
                Operation::Attribute { from, to, .. } if from == to => {
                    return Err(EngineError::MalformedTransaction(format!(
                        "operation {index} changes an attribute to its current value"
                    )));
                }
                _ => {}
            }
        }

        if matches!(operations.last(), Some(Operation::Attribute { .. })) {
            return Err(EngineError::MalformedTransaction(
                "attribute change at the end of the transaction has no element to target"
                    .to_string(),
            ));
        }

        let consumed: usize = operations.iter().map(Operation::old_length).sum();
        if consumed != base_length {
            return Err(EngineError::MalformedTransaction(format!(
                "operations consume {consumed} items but the base sequence has {base_length}"
            )));
        }

        Ok(Self {
            operations,
            base_length,
        })
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn base_length(&self) -> usize {
        self.base_length
    }

    pub fn target_length(&self) -> usize {
        self.operations.iter().map(Operation::new_length).sum()
    }

    /// True when applying the transaction changes nothing
    pub fn is_noop(&self) -> bool {
        self.operations
            .iter()
            .all(|op| matches!(op, Operation::Retain { .. }))
    }

    /// The transaction that undoes this one
    pub fn reversed(&self) -> Transaction {
        Transaction {
            operations: self.operations.iter().map(Operation::reversed).collect(),
            base_length: self.target_length(),
        }
    }

    /// Where `offset` (in the old sequence) ends up after the transaction.
    ///
    /// With `exclude_insertion`, an offset sitting exactly at an insertion
    /// point stays in front of the inserted content instead of being pushed
    /// past it.
    pub fn translate_offset(&self, offset: usize, exclude_insertion: bool) -> usize {
        let mut cursor = 0usize;
        let mut adjustment = 0isize;

        for op in &self.operations {
            match op {
                Operation::Replace { remove, insert } => {
                    let remove_length = remove.len();
                    let insert_length = insert.len();
                    let previous = adjustment;
                    adjustment += insert_length as isize - remove_length as isize;

                    if offset == cursor + remove_length {
                        // Right after the removal, i.e. at the insertion point
                        if exclude_insertion && insert_length > remove_length {
                            return shift(cursor, previous);
                        }
                        return shift(offset, adjustment);
                    } else if offset == cursor {
                        return shift(cursor, previous);
                    } else if offset > cursor && offset < cursor + remove_length {
                        // Inside the removal: snap to the end of the replacement
                        return shift(cursor + remove_length, adjustment);
                    }
                    cursor += remove_length;
                }
                Operation::Retain { length } | Operation::Annotate { length, .. } => {
                    if offset >= cursor && offset < cursor + length {
                        return shift(offset, adjustment);
                    }
                    cursor += length;
                }
                Operation::Attribute { .. } => {}
            }
        }

        shift(offset, adjustment)
    }

    pub fn translate_range(&self, range: LinearRange) -> LinearRange {
        self.translate_range_with(range, false)
    }

    /// Translate both ends of `range`, keeping its direction.
    ///
    /// The start is translated with `!exclude_insertion` and the end with
    /// `exclude_insertion`, so by default a range grows to cover content
    /// inserted at its end but not content inserted at its start.
    pub fn translate_range_with(&self, range: LinearRange, exclude_insertion: bool) -> LinearRange {
        let start = self.translate_offset(range.start(), !exclude_insertion);
        let end = self.translate_offset(range.end(), exclude_insertion).max(start);
        if range.is_backwards() {
            LinearRange::new(end, start)
        } else {
            LinearRange::new(start, end)
        }
    }

    /// Ranges of the new sequence touched by this transaction
    pub fn modified_ranges(&self) -> Vec<std::ops::Range<usize>> {
        let mut ranges: Vec<std::ops::Range<usize>> = Vec::new();
        let mut cursor = 0;

        for op in &self.operations {
            let touched = match op {
                Operation::Retain { length } => {
                    cursor += length;
                    None
                }
                Operation::Replace { insert, .. } => {
                    let range = cursor..cursor + insert.len();
                    cursor += insert.len();
                    Some(range)
                }
                Operation::Attribute { .. } => Some(cursor..cursor + 1),
                Operation::Annotate { length, .. } => {
                    let range = cursor..cursor + length;
                    cursor += length;
                    Some(range)
                }
            };

            if let Some(range) = touched {
                match ranges.last_mut() {
                    Some(last) if last.end >= range.start => last.end = last.end.max(range.end),
                    _ => ranges.push(range),
                }
            }
        }

        ranges
    }
}

fn shift(offset: usize, adjustment: isize) -> usize {
    offset.saturating_add_signed(adjustment)
}
