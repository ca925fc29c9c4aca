//! Identity-based move detection.
//!
//! Items carry stable ids, so content that a transaction removes and puts back
//! unchanged is recognised by comparing items, never by comparing text. Two
//! passes run before the modifier touches the tree:
//!
//! - inside one replace, the longest run of items present on both sides is
//!   turned into a retain (recursively on what is left around it);
//! - across replaces, a balanced segment removed in one place and inserted
//!   identically in another is a relocation of that node.

use std::collections::{HashMap, HashSet};

use crate::linear::{Item, ItemId, matching_close};
use crate::transaction::Operation;

/// A transaction operation as the modifier consumes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Retain(usize),
    Replace { remove: Vec<Item>, insert: Vec<Item> },
    Attribute { key: String, to: Option<String> },
}

/// Lower `operations` into steps, turning carried-through items into retains
pub(crate) fn normalize(operations: &[Operation]) -> Vec<Step> {
    let mut steps = Vec::new();
    for op in operations {
        match op {
            Operation::Retain { length } | Operation::Annotate { length, .. } => {
                push_retain(&mut steps, *length);
            }
            Operation::Replace { remove, insert } => split_replace(&mut steps, remove, insert),
            Operation::Attribute { key, to, .. } => steps.push(Step::Attribute {
                key: key.clone(),
                to: to.clone(),
            }),
        }
    }
    steps
}

fn push_retain(steps: &mut Vec<Step>, length: usize) {
    if length == 0 {
        return;
    }
    if let Some(Step::Retain(previous)) = steps.last_mut() {
        *previous += length;
    } else {
        steps.push(Step::Retain(length));
    }
}

fn split_replace(steps: &mut Vec<Step>, remove: &[Item], insert: &[Item]) {
    if remove.is_empty() && insert.is_empty() {
        return;
    }
    match longest_common_run(remove, insert) {
        Some((at_remove, at_insert, length)) => {
            split_replace(steps, &remove[..at_remove], &insert[..at_insert]);
            push_retain(steps, length);
            split_replace(
                steps,
                &remove[at_remove + length..],
                &insert[at_insert + length..],
            );
        }
        None => steps.push(Step::Replace {
            remove: remove.to_vec(),
            insert: insert.to_vec(),
        }),
    }
}

/// Start in each slice and length of the longest run of identical items
fn longest_common_run(a: &[Item], b: &[Item]) -> Option<(usize, usize, usize)> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let positions: HashMap<ItemId, usize> = b.iter().enumerate().map(|(i, item)| (item.id(), i)).collect();

    let mut best: Option<(usize, usize, usize)> = None;
    let mut i = 0;
    while i < a.len() {
        let Some(&j) = positions.get(&a[i].id()) else {
            i += 1;
            continue;
        };
        let mut length = 0;
        while i + length < a.len() && j + length < b.len() && a[i + length] == b[j + length] {
            length += 1;
        }
        if length > best.map_or(0, |(_, _, l)| l) {
            best = Some((i, j, length));
        }
        i += length.max(1);
    }
    best
}

/// Open-marker ids of balanced segments in `items`, with the segment they span
pub(crate) fn balanced_segments(items: &[Item]) -> Vec<(ItemId, &[Item])> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_open())
        .filter_map(|(at, item)| {
            matching_close(items, at).map(|close| (item.id(), &items[at..=close]))
        })
        .collect()
}

/// Ids of nodes that one replace removes and another reinserts unchanged
pub(crate) fn relocations(steps: &[Step]) -> HashSet<ItemId> {
    let mut removed: HashMap<ItemId, &[Item]> = HashMap::new();
    let mut inserted: HashMap<ItemId, &[Item]> = HashMap::new();
    for step in steps {
        if let Step::Replace { remove, insert } = step {
            removed.extend(balanced_segments(remove));
            inserted.extend(balanced_segments(insert));
        }
    }
    removed
        .into_iter()
        .filter(|(id, segment)| inserted.get(id) == Some(segment))
        .map(|(id, _)| id)
        .collect()
}

/// Whether the segment holds a relocated node below its own open marker
pub(crate) fn contains_relocation(segment: &[Item], relocated: &HashSet<ItemId>) -> bool {
    segment
        .iter()
        .skip(1)
        .any(|item| item.is_open() && relocated.contains(&item.id()))
}
