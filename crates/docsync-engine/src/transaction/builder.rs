use std::ops::Range;

use crate::error::{EngineError, Result};
use crate::linear::{AnnotationRef, Item, LinearData, NodeKind};

use super::{AnnotationAction, Operation, Transaction};

/// Accumulates operations, merging neighbours that can be merged.
///
/// ```rust
/// # use docsync_engine::{Item, LinearData, TransactionBuilder};
/// let data = LinearData::from_markup("<p>foo</p>").unwrap();
/// let tx = TransactionBuilder::new()
///     .retain(4)
///     .insert(Item::text("!"))
///     .retain(1)
///     .build(data.len())
///     .unwrap();
/// assert_eq!(tx.target_length(), 6);
/// ```
#[derive(Debug, Default, Clone)]
pub struct TransactionBuilder {
    operations: Vec<Operation>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retain(&mut self, length: usize) -> &mut Self {
        if length == 0 {
            return self;
        }
        if let Some(Operation::Retain { length: previous }) = self.operations.last_mut() {
            *previous += length;
        } else {
            self.operations.push(Operation::Retain { length });
        }
        self
    }

    pub fn replace(&mut self, remove: Vec<Item>, insert: Vec<Item>) -> &mut Self {
        if remove.is_empty() && insert.is_empty() {
            return self;
        }
        if let Some(Operation::Replace {
            remove: previous_remove,
            insert: previous_insert,
        }) = self.operations.last_mut()
        {
            previous_remove.extend(remove);
            previous_insert.extend(insert);
        } else {
            self.operations.push(Operation::Replace { remove, insert });
        }
        self
    }

    pub fn insert(&mut self, items: Vec<Item>) -> &mut Self {
        self.replace(Vec::new(), items)
    }

    pub fn remove(&mut self, items: Vec<Item>) -> &mut Self {
        self.replace(items, Vec::new())
    }

    pub fn attribute(
        &mut self,
        key: impl Into<String>,
        from: Option<String>,
        to: Option<String>,
    ) -> &mut Self {
        self.operations.push(Operation::Attribute {
            key: key.into(),
            from,
            to,
        });
        self
    }

    pub fn annotate(
        &mut self,
        action: AnnotationAction,
        annotation: AnnotationRef,
        length: usize,
    ) -> &mut Self {
        if length == 0 {
            return self;
        }
        if let Some(Operation::Annotate {
            action: previous_action,
            annotation: previous_annotation,
            length: previous_length,
        }) = self.operations.last_mut()
        {
            if *previous_action == action && *previous_annotation == annotation {
                *previous_length += length;
                return self;
            }
        }
        self.operations.push(Operation::Annotate {
            action,
            annotation,
            length,
        });
        self
    }

    /// Finish, validating against a base of `base_length` items
    pub fn build(&mut self, base_length: usize) -> Result<Transaction> {
        Transaction::new(base_length, std::mem::take(&mut self.operations))
    }
}

fn check_range(data: &LinearData, range: &Range<usize>) -> Result<()> {
    if range.start > range.end || range.end > data.len() {
        return Err(EngineError::MalformedTransaction(format!(
            "range {range:?} is outside a sequence of {} items",
            data.len()
        )));
    }
    Ok(())
}

impl Transaction {
    /// Insert `items` at `offset`
    pub fn insertion(data: &LinearData, offset: usize, items: Vec<Item>) -> Result<Transaction> {
        Self::replacement(data, offset..offset, items)
    }

    /// Remove the items in `range`
    pub fn removal(data: &LinearData, range: Range<usize>) -> Result<Transaction> {
        Self::replacement(data, range, Vec::new())
    }

    /// Replace the items in `range` with `items`
    pub fn replacement(
        data: &LinearData,
        range: Range<usize>,
        items: Vec<Item>,
    ) -> Result<Transaction> {
        check_range(data, &range)?;
        TransactionBuilder::new()
            .retain(range.start)
            .replace(data.items()[range.clone()].to_vec(), items)
            .retain(data.len() - range.end)
            .build(data.len())
    }

    /// Set (or with `None`, remove) attribute `key` on the open marker at `offset`
    pub fn attribute_change(
        data: &LinearData,
        offset: usize,
        key: &str,
        value: Option<&str>,
    ) -> Result<Transaction> {
        let Some(Item::Open { attributes, .. }) = data.items().get(offset) else {
            return Err(EngineError::MalformedTransaction(format!(
                "no open marker at offset {offset}"
            )));
        };
        let from = attributes.get(key).cloned();
        let to = value.map(str::to_string);

        let mut builder = TransactionBuilder::new();
        builder.retain(offset);
        if from != to {
            builder.attribute(key, from, to);
        }
        builder.retain(data.len() - offset).build(data.len())
    }

    /// Set or clear `annotation` on the characters in `range`.
    ///
    /// Characters that already are in the requested state are retained, so the
    /// reversed transaction restores exactly the previous annotations.
    pub fn annotation(
        data: &LinearData,
        range: Range<usize>,
        action: AnnotationAction,
        annotation: AnnotationRef,
    ) -> Result<Transaction> {
        check_range(data, &range)?;
        let mut builder = TransactionBuilder::new();
        builder.retain(range.start);

        for item in &data.items()[range.clone()] {
            let has = item.annotations().contains(&annotation);
            let changes = item.is_char()
                && match action {
                    AnnotationAction::Set => !has,
                    AnnotationAction::Clear => has,
                };
            if changes {
                builder.annotate(action, annotation.clone(), 1);
            } else {
                builder.retain(1);
            }
        }

        builder.retain(data.len() - range.end).build(data.len())
    }

    /// Wrap the sibling run in `range` in new containers, outermost first.
    ///
    /// The wrapped content is retained, so the tree modifier moves the existing
    /// nodes into the new containers instead of recreating them.
    pub fn wrap(data: &LinearData, range: Range<usize>, wrappers: &[NodeKind]) -> Result<Transaction> {
        Self::wrap_each(data, range, wrappers, &[])
    }

    /// Like [`Transaction::wrap`], additionally wrapping every element at the
    /// top of `range` in its own `each` chain, e.g. a list item per paragraph.
    pub fn wrap_each(
        data: &LinearData,
        range: Range<usize>,
        wrappers: &[NodeKind],
        each: &[NodeKind],
    ) -> Result<Transaction> {
        check_range(data, &range)?;
        if wrappers.iter().chain(each).any(|kind| !kind.is_marker()) {
            return Err(EngineError::MalformedTransaction(
                "wrappers must be element kinds".to_string(),
            ));
        }

        let mut builder = TransactionBuilder::new();
        builder.retain(range.start).insert(opens(wrappers));
        if each.is_empty() {
            builder.retain(range.len());
        } else {
            let mut offset = range.start;
            while offset < range.end {
                let end = data
                    .matching_close(offset)
                    .filter(|&close| close < range.end)
                    .ok_or_else(|| {
                        EngineError::MalformedTransaction(format!(
                            "offset {offset} does not start an element inside {range:?}"
                        ))
                    })?;
                builder
                    .insert(opens(each))
                    .retain(end + 1 - offset)
                    .insert(closes(each));
                offset = end + 1;
            }
        }
        builder
            .insert(closes(wrappers))
            .retain(data.len() - range.end)
            .build(data.len())
    }
}

fn opens(kinds: &[NodeKind]) -> Vec<Item> {
    kinds.iter().map(|kind| Item::open(*kind)).collect()
}

fn closes(kinds: &[NodeKind]) -> Vec<Item> {
    kinds.iter().rev().map(|kind| Item::close(*kind)).collect()
}
