//! # Linear Data Store
//!
//! The flat, authoritative representation of a document: a sequence of open
//! markers, close markers and characters that linearizes the node tree.
//!
//! `LinearData` only ever holds well-formed sequences. Construction validates,
//! and a commit computes and validates the complete new sequence before
//! swapping it in, so the store is never observed half-updated.

mod item;
mod kind;
mod markup;

pub use item::{AnnotationRef, Attributes, Item, ItemId};
pub use kind::NodeKind;
pub use markup::{markup_name, parse_markup, to_markup};

use crate::error::{EngineError, Result};
use crate::transaction::{AnnotationAction, Operation, Transaction};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearData {
    items: Vec<Item>,
}

impl LinearData {
    pub fn new(items: Vec<Item>) -> Result<Self> {
        validate(&items)?;
        Ok(Self { items })
    }

    pub fn from_markup(markup: &str) -> Result<Self> {
        Self::new(parse_markup(markup)?)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, offset: usize) -> Option<&Item> {
        self.items.get(offset)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_markup(&self) -> String {
        to_markup(&self.items)
    }

    /// Characters only, markers skipped
    pub fn text(&self) -> String {
        self.items.iter().filter_map(Item::as_char).collect()
    }

    /// Offset of the close marker matching the open marker at `open`
    pub fn matching_close(&self, open: usize) -> Option<usize> {
        matching_close(&self.items, open)
    }

    /// Compute the sequence `transaction` would produce, without applying it.
    ///
    /// Fails with `StaleTransaction` when the transaction's old side does not
    /// match these items, and with `StructuralViolation` when the result would
    /// not be a valid linearization.
    pub fn preview(&self, transaction: &Transaction) -> Result<Vec<Item>> {
        if transaction.base_length() != self.items.len() {
            return Err(EngineError::stale(
                0,
                format!(
                    "transaction expects {} items, document has {}",
                    transaction.base_length(),
                    self.items.len()
                ),
            ));
        }

        let mut out: Vec<Item> = Vec::with_capacity(transaction.target_length());
        // (position in `out`, old offset, key, value) for pending attribute changes
        let mut attribute_changes: Vec<(usize, usize, &str, Option<&str>)> = Vec::new();
        let mut offset = 0;

        for op in transaction.operations() {
            match op {
                Operation::Retain { length } => {
                    out.extend_from_slice(&self.items[offset..offset + length]);
                    offset += length;
                }
                Operation::Replace { remove, insert } => {
                    for (index, expected) in remove.iter().enumerate() {
                        if self.items.get(offset + index) != Some(expected) {
                            return Err(EngineError::stale(
                                offset + index,
                                "removed item does not match the live item",
                            ));
                        }
                    }
                    out.extend_from_slice(insert);
                    offset += remove.len();
                }
                Operation::Attribute { key, from, to } => {
                    let Some(Item::Open { attributes, .. }) = self.items.get(offset) else {
                        return Err(EngineError::stale(
                            offset,
                            "attribute change does not target an open marker",
                        ));
                    };
                    if attributes.get(key) != from.as_ref() {
                        return Err(EngineError::stale(
                            offset,
                            format!("attribute {key:?} is not {from:?}"),
                        ));
                    }
                    attribute_changes.push((out.len(), offset, key, to.as_deref()));
                }
                Operation::Annotate {
                    action,
                    annotation,
                    length,
                } => {
                    let set = *action == AnnotationAction::Set;
                    for (index, item) in self.items[offset..offset + length].iter().enumerate() {
                        if !item.is_char() {
                            out.push(item.clone());
                            continue;
                        }
                        if item.annotations().contains(annotation) == set {
                            return Err(EngineError::stale(
                                offset + index,
                                format!("annotation {:?} is already in the requested state", annotation.0),
                            ));
                        }
                        out.push(item.with_annotation(annotation, set));
                    }
                    offset += length;
                }
            }
        }

        for (position, old_offset, key, value) in attribute_changes {
            let target = &self.items[old_offset];
            match out.get(position) {
                Some(item) if item.id() == target.id() && item.is_open() => {
                    out[position] = item.with_attribute(key, value);
                }
                _ => {
                    return Err(EngineError::MalformedTransaction(format!(
                        "attribute change at offset {old_offset} is not followed by a retain of its element"
                    )));
                }
            }
        }

        validate(&out).map_err(|err| match err {
            EngineError::MalformedDocument { offset, reason } => {
                EngineError::StructuralViolation(format!("result at offset {offset}: {reason}"))
            }
            other => other,
        })?;
        Ok(out)
    }

    /// Apply `transaction`. Nothing changes if it fails.
    pub fn commit(&mut self, transaction: &Transaction) -> Result<()> {
        let items = self.preview(transaction)?;
        self.items = items;
        Ok(())
    }

    /// Swap in an already validated sequence
    pub(crate) fn replace_validated(&mut self, items: Vec<Item>) {
        self.items = items;
    }
}

/// Offset of the close matching the open at `open` within `items`
pub(crate) fn matching_close(items: &[Item], open: usize) -> Option<usize> {
    if !items.get(open)?.is_open() {
        return None;
    }
    let mut depth = 0usize;
    for (offset, item) in items.iter().enumerate().skip(open) {
        match item {
            Item::Open { .. } => depth += 1,
            Item::Close { .. } => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            Item::Char { .. } => {}
        }
    }
    None
}

/// Check that `items` linearize a valid tree under the document root
pub fn validate(items: &[Item]) -> Result<()> {
    let mut stack = vec![NodeKind::Document];

    for (offset, item) in items.iter().enumerate() {
        let parent = *stack.last().unwrap_or(&NodeKind::Document);
        match item {
            Item::Open { kind, .. } => {
                if !kind.is_marker() {
                    return Err(EngineError::malformed_document(
                        offset,
                        format!("{kind} cannot appear as a marker"),
                    ));
                }
                if !parent.can_contain(*kind) {
                    return Err(EngineError::malformed_document(
                        offset,
                        format!("{parent} cannot contain {kind}"),
                    ));
                }
                stack.push(*kind);
            }
            Item::Close { kind, .. } => {
                if stack.len() == 1 || parent != *kind {
                    return Err(EngineError::malformed_document(
                        offset,
                        format!("close of {kind} does not match open {parent}"),
                    ));
                }
                stack.pop();
            }
            Item::Char { .. } => {
                if !parent.can_contain_text() {
                    return Err(EngineError::malformed_document(
                        offset,
                        format!("{parent} cannot contain text"),
                    ));
                }
            }
        }
    }

    if stack.len() > 1 {
        return Err(EngineError::malformed_document(
            items.len(),
            format!("{} unclosed element(s)", stack.len() - 1),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionBuilder;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("")]
    #[case("<p></p>")]
    #[case("<p>foo<image/>bar</p>")]
    #[case("<div><p>foobarbaz</p><p>qux</p></div><p>quux</p>")]
    #[case("<list><listItem><p>a</p></listItem></list>")]
    fn test_valid_sequences(#[case] markup: &str) {
        assert!(LinearData::from_markup(markup).is_ok());
    }

    #[rstest]
    #[case("foo", 0)]
    #[case("<p>foo", 4)]
    #[case("<p>foo</div>", 4)]
    #[case("<div>a</div>", 1)]
    #[case("<p><p></p></p>", 1)]
    #[case("<p><image>x</image></p>", 2)]
    #[case("</p>", 0)]
    fn test_invalid_sequences(#[case] markup: &str, #[case] at: usize) {
        let err = LinearData::from_markup(markup).unwrap_err();
        assert!(
            matches!(err, EngineError::MalformedDocument { offset, .. } if offset == at),
            "{markup}: {err}"
        );
    }

    #[test]
    fn test_matching_close() {
        let data = LinearData::from_markup("<div><p>ab</p></div><p></p>").unwrap();
        assert_eq!(data.matching_close(0), Some(5));
        assert_eq!(data.matching_close(1), Some(4));
        assert_eq!(data.matching_close(6), Some(7));
        assert_eq!(data.matching_close(2), None);
    }

    #[test]
    fn test_commit_keeps_identity_of_retained_items() {
        let mut data = LinearData::from_markup("<p>abc</p>").unwrap();
        let before = data.items().to_vec();
        let tx = Transaction::insertion(&data, 2, Item::text("X")).unwrap();

        data.commit(&tx).unwrap();

        assert_eq!(data.to_markup(), "<p>aXbc</p>");
        assert_eq!(data.items()[1], before[1]);
        assert_eq!(data.items()[3], before[2]);
    }

    #[test]
    fn test_stale_removal_leaves_data_untouched() {
        let mut data = LinearData::from_markup("<p>abc</p>").unwrap();
        let snapshot = data.clone();
        let tx = TransactionBuilder::new()
            .retain(1)
            .remove(Item::text("a"))
            .retain(3)
            .build(5)
            .unwrap();

        let err = data.commit(&tx).unwrap_err();

        assert!(matches!(err, EngineError::StaleTransaction { offset: 1, .. }));
        assert_eq!(data, snapshot);
    }

    #[test]
    fn test_wrong_base_length_is_stale() {
        let data = LinearData::from_markup("<p>abc</p>").unwrap();
        let tx = TransactionBuilder::new().retain(4).build(4).unwrap();
        assert!(matches!(
            data.preview(&tx),
            Err(EngineError::StaleTransaction { .. })
        ));
    }

    #[test]
    fn test_unbalanced_result_is_rejected() {
        let data = LinearData::from_markup("<p>abc</p>").unwrap();
        let tx = Transaction::removal(&data, 0..1).unwrap();
        assert!(matches!(
            data.preview(&tx),
            Err(EngineError::StructuralViolation(_))
        ));
    }

    #[test]
    fn test_unwrapping_text_to_the_root_is_a_structural_violation() {
        let mut data = LinearData::from_markup("<p>foo</p>").unwrap();
        let tx = TransactionBuilder::new()
            .remove(vec![data.items()[0].clone()])
            .retain(3)
            .remove(vec![data.items()[4].clone()])
            .build(5)
            .unwrap();

        let err = data.commit(&tx).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Structural violation: result at offset 0: document cannot contain text"
        );
        assert_eq!(data.to_markup(), "<p>foo</p>");
    }

    #[test]
    fn test_attribute_change_applies_to_following_retain() {
        let mut data = LinearData::from_markup("<h>abc</h>").unwrap();
        let tx = Transaction::attribute_change(&data, 0, "level", Some("3")).unwrap();

        data.commit(&tx).unwrap();

        let attributes = data.items()[0].attributes().unwrap();
        assert_eq!(attributes.get("level").map(String::as_str), Some("3"));

        data.commit(&tx.reversed()).unwrap();
        assert!(data.items()[0].attributes().unwrap().is_empty());
    }

    #[test]
    fn test_attribute_change_must_target_retained_marker() {
        let data = LinearData::from_markup("<h>abc</h>").unwrap();
        let replacement = crate::linear::parse_markup("<p>abc</p>").unwrap();
        let tx = TransactionBuilder::new()
            .attribute("level", None, Some("1".into()))
            .replace(data.items().to_vec(), replacement)
            .build(5)
            .unwrap();

        assert!(matches!(
            data.preview(&tx),
            Err(EngineError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_annotation_round_trip_is_exact() {
        let mut data = LinearData::from_markup("<p>abc</p>").unwrap();
        let bold = AnnotationRef::new("textStyle/bold");
        let original = data.clone();

        let tx = Transaction::annotation(&data, 1..3, AnnotationAction::Set, bold.clone()).unwrap();
        data.commit(&tx).unwrap();
        assert_eq!(data.items()[1].annotations(), &[bold.clone()]);
        assert!(data.items()[3].annotations().is_empty());

        // Setting it again over the same range is stale
        let again = TransactionBuilder::new()
            .retain(1)
            .annotate(AnnotationAction::Set, bold, 1)
            .retain(3)
            .build(5)
            .unwrap();
        assert!(data.preview(&again).is_err());

        data.commit(&tx.reversed()).unwrap();
        assert_eq!(data, original);
    }
}
