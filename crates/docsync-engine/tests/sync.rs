use docsync_engine::{
    AnnotationAction, AnnotationRef, Document, DocumentTree, EngineConfig, EngineError, Item, LinearData,
    NodeKind, Operation, Transaction, TransactionBuilder, TreeModifier, TreeOperation, TreeSync,
};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;

const DENSE: &str = "<div><p>foobarbaz</p><p>qux</p></div><p>quux</p>";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `insertNode list` for node operations, `moveText 3` for text operations
fn summary(op: &TreeOperation) -> String {
    match op {
        TreeOperation::InsertNode { kind, .. }
        | TreeOperation::RemoveNode { kind, .. }
        | TreeOperation::MoveNode { kind, .. } => format!("{} {kind}", op.name()),
        TreeOperation::InsertText { length, .. }
        | TreeOperation::RemoveText { length, .. }
        | TreeOperation::MoveText { length, .. } => format!("{} {length}", op.name()),
    }
}

/// Turn the div into a list item, split the first paragraph after "foo",
/// uppercase "baz" and "uu", and append a paragraph holding an image.
fn dense_transaction(data: &LinearData) -> Transaction {
    let old = data.items();
    let mut new_paragraph = vec![Item::open(NodeKind::Paragraph)];
    new_paragraph.extend(Item::leaf(NodeKind::Image));
    new_paragraph.push(Item::close(NodeKind::Paragraph));

    TransactionBuilder::new()
        .replace(
            old[0..1].to_vec(),
            vec![Item::open(NodeKind::List), Item::open(NodeKind::ListItem)],
        )
        .retain(4)
        .insert(vec![Item::close(NodeKind::Paragraph), Item::open(NodeKind::Paragraph)])
        .retain(3)
        .replace(old[8..11].to_vec(), Item::text("BAZ"))
        .retain(6)
        .replace(
            old[17..18].to_vec(),
            vec![Item::close(NodeKind::ListItem), Item::close(NodeKind::List)],
        )
        .retain(2)
        .replace(old[20..22].to_vec(), Item::text("UU"))
        .retain(2)
        .insert(new_paragraph)
        .build(data.len())
        .unwrap()
}

#[test]
fn test_dense_example_operation_sequence() {
    init_logging();
    let mut doc = Document::from_markup(DENSE).unwrap();
    let tree = doc.tree();
    let div = tree.children(tree.root())[0];
    let first = tree.children(div)[0];
    let qux = tree.children(div)[1];
    let quux = tree.children(tree.root())[1];
    let tx = dense_transaction(doc.data());

    let report = doc.commit(&tx).unwrap();

    let ops: Vec<String> = report.tree_operations.iter().map(summary).collect();
    assert_eq!(
        ops,
        vec![
            "insertNode list",
            "insertNode listItem",
            "moveNode paragraph",
            "insertNode paragraph",
            "moveText 3",
            "removeText 3",
            "insertText 3",
            "moveNode paragraph",
            "removeNode div",
            "removeText 2",
            "insertText 2",
            "insertNode paragraph",
            "insertNode image",
        ]
    );
    assert_eq!(
        doc.data().to_markup(),
        "<list><listItem><p>foo</p><p>barBAZ</p><p>qux</p></listItem></list><p>qUUx</p><p><image></image></p>"
    );
    assert_eq!(doc.verify_tree(), None);

    let tree = doc.tree();
    assert_eq!(tree.node_at_path(&[0, 0, 0]), Some(first));
    assert_eq!(tree.node_at_path(&[0, 0, 2]), Some(qux));
    assert_eq!(tree.node_at_path(&[1]), Some(quux));
    assert_eq!(tree.node(div), None);
    assert!(report.tree_operations.iter().all(|op| op.node() != Some(quux)));
}

#[test]
fn test_dense_example_operations_per_step() {
    let data = LinearData::from_markup(DENSE).unwrap();
    let mut tree = DocumentTree::build(&data);
    let tx = dense_transaction(&data);
    let mut modifier = TreeModifier::new(&mut tree, &tx).unwrap();
    assert_eq!(modifier.remaining_steps(), 11);

    let mut steps: Vec<Vec<String>> = Vec::new();
    while let Some(ops) = modifier.step().unwrap() {
        steps.push(ops.iter().map(summary).collect());
    }
    let before_tail = modifier.operations().len();
    modifier.complete().unwrap();
    steps.push(modifier.operations()[before_tail..].iter().map(summary).collect());

    let expected: Vec<Vec<&str>> = vec![
        vec!["insertNode list", "insertNode listItem"],
        vec!["moveNode paragraph"],
        vec!["insertNode paragraph"],
        vec!["moveText 3"],
        vec!["removeText 3", "insertText 3"],
        vec!["moveNode paragraph"],
        vec!["removeNode div"],
        vec![],
        vec!["removeText 2", "insertText 2"],
        vec![],
        vec!["insertNode paragraph", "insertNode image"],
        vec![],
    ];
    assert_eq!(steps, expected);
}

#[test]
fn test_dense_example_reverses() {
    init_logging();
    let mut doc = Document::from_markup(DENSE).unwrap();
    let original = doc.data().clone();
    let tx = dense_transaction(doc.data());

    doc.commit(&tx).unwrap();
    doc.commit(&tx.reversed()).unwrap();

    assert_eq!(doc.data(), &original);
    assert!(doc.tree().same_structure(&DocumentTree::build(&original)));
    assert_eq!(doc.verify_tree(), None);
}

fn insert_text(data: &LinearData) -> Transaction {
    Transaction::insertion(data, 2, Item::text("new")).unwrap()
}

fn remove_paragraph(data: &LinearData) -> Transaction {
    Transaction::removal(data, 0..4).unwrap()
}

fn wrap_in_list(data: &LinearData) -> Transaction {
    Transaction::wrap(data, 0..data.len(), &[NodeKind::List, NodeKind::ListItem]).unwrap()
}

fn set_alignment(data: &LinearData) -> Transaction {
    Transaction::attribute_change(data, 4, "align", Some("center")).unwrap()
}

fn bold_across_paragraphs(data: &LinearData) -> Transaction {
    Transaction::annotation(data, 1..7, AnnotationAction::Set, AnnotationRef::new("textStyle/bold")).unwrap()
}

fn merge_paragraphs(data: &LinearData) -> Transaction {
    Transaction::removal(data, 3..5).unwrap()
}

fn move_first_to_end(data: &LinearData) -> Transaction {
    let first = data.items()[0..4].to_vec();
    TransactionBuilder::new()
        .remove(first.clone())
        .retain(data.len() - 4)
        .insert(first)
        .build(data.len())
        .unwrap()
}

#[rstest]
#[case::insert_text(insert_text)]
#[case::remove_paragraph(remove_paragraph)]
#[case::wrap_in_list(wrap_in_list)]
#[case::set_alignment(set_alignment)]
#[case::bold_across_paragraphs(bold_across_paragraphs)]
#[case::merge_paragraphs(merge_paragraphs)]
#[case::move_first_to_end(move_first_to_end)]
fn test_reversed_transaction_restores_items(#[case] make: fn(&LinearData) -> Transaction) {
    let mut doc = Document::from_markup("<p>ab</p><p>cd</p>").unwrap();
    let original = doc.data().clone();
    let tx = make(doc.data());

    doc.commit(&tx).unwrap();
    assert_eq!(doc.verify_tree(), None);
    doc.commit(&tx.reversed()).unwrap();

    assert_eq!(doc.data(), &original);
    assert_eq!(doc.verify_tree(), None);
    assert!(doc.tree().same_structure(&DocumentTree::build(&original)));
}

/// Old offsets of every item the transaction carries through a retain
fn retained_offsets(tx: &Transaction) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut cursor = 0;
    for op in tx.operations() {
        match op {
            Operation::Retain { length } | Operation::Annotate { length, .. } => {
                offsets.extend(cursor..cursor + length);
                cursor += length;
            }
            Operation::Replace { remove, .. } => cursor += remove.len(),
            Operation::Attribute { .. } => {}
        }
    }
    offsets
}

#[rstest]
#[case::insert_text(insert_text)]
#[case::remove_paragraph(remove_paragraph)]
#[case::wrap_in_list(wrap_in_list)]
#[case::merge_paragraphs(merge_paragraphs)]
#[case::move_first_to_end(move_first_to_end)]
fn test_translate_offset_follows_retained_items(#[case] make: fn(&LinearData) -> Transaction) {
    let data = LinearData::from_markup("<p>ab</p><p>cd</p>").unwrap();
    let tx = make(&data);
    let mut after = data.clone();
    after.commit(&tx).unwrap();

    for offset in retained_offsets(&tx) {
        let translated = tx.translate_offset(offset, false);
        assert_eq!(
            after.get(translated).map(Item::id),
            data.get(offset).map(Item::id),
            "item at {offset} should land at {translated}"
        );
    }
    assert_eq!(tx.translate_offset(data.len(), false), after.len());
}

#[test]
fn test_translate_offset_at_insertion_point() {
    let data = LinearData::from_markup("<p>ab</p>").unwrap();
    let tx = Transaction::insertion(&data, 2, Item::text("XYZ")).unwrap();

    assert_eq!(tx.translate_offset(2, false), 5);
    assert_eq!(tx.translate_offset(2, true), 2);
    assert_eq!(tx.translate_offset(1, false), 1);
    assert_eq!(tx.translate_offset(3, false), 6);
}

#[test]
fn test_wrapping_moves_existing_paragraphs() {
    let mut doc = Document::from_markup("<p>ab</p><p>cd</p><p>ef</p>").unwrap();
    let before: Vec<_> = doc.tree().children(doc.tree().root()).to_vec();
    let tx = Transaction::wrap(doc.data(), 0..8, &[NodeKind::List, NodeKind::ListItem]).unwrap();

    let report = doc.commit(&tx).unwrap();

    assert!(
        report
            .tree_operations
            .iter()
            .all(|op| !matches!(op, TreeOperation::RemoveNode { .. }))
    );
    let moved: Vec<_> = report
        .tree_operations
        .iter()
        .filter(|op| matches!(op, TreeOperation::MoveNode { .. }))
        .filter_map(TreeOperation::node)
        .collect();
    assert_eq!(moved, before[0..2].to_vec());

    let tree = doc.tree();
    assert_eq!(tree.node_at_path(&[0, 0, 0]), Some(before[0]));
    assert_eq!(tree.node_at_path(&[0, 0, 1]), Some(before[1]));
    assert_eq!(tree.node_at_path(&[1]), Some(before[2]));
}

#[test]
fn test_failed_commits_leave_document_untouched() {
    let mut doc = Document::from_markup("<p>ab</p>").unwrap();
    let before = doc.clone();

    let other = LinearData::from_markup("<p>ab</p>").unwrap();
    let stale = Transaction::removal(&other, 1..3).unwrap();
    assert!(matches!(doc.commit(&stale), Err(EngineError::StaleTransaction { .. })));

    let text_at_root = Transaction::insertion(doc.data(), 0, Item::text("x")).unwrap();
    assert!(matches!(
        doc.commit(&text_at_root),
        Err(EngineError::StructuralViolation(_))
    ));

    assert_eq!(doc.data(), before.data());
    assert_eq!(doc.tree(), before.tree());
    assert_eq!(doc.version(), before.version());
}

#[rstest]
#[case(TreeSync::Incremental)]
#[case(TreeSync::Rebuild)]
fn test_commit_sequence_matches_rebuild(#[case] tree_sync: TreeSync) {
    init_logging();
    let config = EngineConfig {
        tree_sync,
        ..EngineConfig::default()
    };
    let items = LinearData::from_markup("<h>title</h><p>one</p><p>two</p>").unwrap().items().to_vec();
    let mut doc = Document::with_config(items, config).unwrap();

    let edits: [fn(&LinearData) -> Transaction; 6] = [
        |data| Transaction::insertion(data, 6, Item::text("!")).unwrap(),
        |data| Transaction::wrap(data, 8..18, &[NodeKind::BlockQuote]).unwrap(),
        |data| Transaction::removal(data, 13..15).unwrap(),
        |data| Transaction::attribute_change(data, 0, "level", Some("2")).unwrap(),
        |data| {
            let mut image = vec![Item::open(NodeKind::Paragraph)];
            image.extend(Item::leaf(NodeKind::Image));
            image.push(Item::close(NodeKind::Paragraph));
            Transaction::insertion(data, data.len(), image).unwrap()
        },
        |data| Transaction::removal(data, 0..8).unwrap(),
    ];

    for (n, edit) in edits.iter().enumerate() {
        let tx = edit(doc.data());
        doc.commit(&tx).unwrap();
        assert_eq!(doc.verify_tree(), None, "after edit {n}:\n{}", doc.dump());
    }
    assert_eq!(doc.version(), 6);
    assert_eq!(doc.data().to_markup(), "<blockQuote><p>onetwo</p></blockQuote><p><image></image></p>");
}

#[test]
fn test_config_file_drives_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "tree_sync = \"rebuild\"\nverify_commits = true\n").unwrap();

    let config = EngineConfig::load_from_path(&path).unwrap().unwrap();
    let items = LinearData::from_markup("<p>ab</p>").unwrap().items().to_vec();
    let mut doc = Document::with_config(items, config).unwrap();
    let tx = Transaction::insertion(doc.data(), 1, Item::text("x")).unwrap();

    let report = doc.commit(&tx).unwrap();

    assert_eq!(doc.config().tree_sync, TreeSync::Rebuild);
    assert!(report.tree_operations.is_empty());
    assert_eq!(doc.data().to_markup(), "<p>xab</p>");
}

const STRUCTURAL: [NodeKind; 5] = [
    NodeKind::Div,
    NodeKind::List,
    NodeKind::ListItem,
    NodeKind::BlockQuote,
    NodeKind::Paragraph,
];

fn random_inline(rng: &mut StdRng, out: &mut String) {
    for _ in 0..rng.random_range(0..=3) {
        if rng.random_bool(0.2) {
            out.push_str("<image/>");
        } else {
            out.push(['a', 'b', 'c'][rng.random_range(0..3)]);
        }
    }
}

fn random_block(rng: &mut StdRng, depth: usize, out: &mut String) {
    let choice = if depth >= 3 { 0 } else { rng.random_range(0..4) };
    match choice {
        0 => {
            out.push_str("<p>");
            random_inline(rng, out);
            out.push_str("</p>");
        }
        1 | 3 => {
            let tag = if choice == 1 { "blockQuote" } else { "div" };
            out.push_str(&format!("<{tag}>"));
            for _ in 0..rng.random_range(1..=2) {
                random_block(rng, depth + 1, out);
            }
            out.push_str(&format!("</{tag}>"));
        }
        _ => {
            out.push_str("<list>");
            for _ in 0..rng.random_range(1..=2) {
                out.push_str("<listItem>");
                for _ in 0..rng.random_range(1..=2) {
                    random_block(rng, depth + 2, out);
                }
                out.push_str("</listItem>");
            }
            out.push_str("</list>");
        }
    }
}

fn random_document(rng: &mut StdRng) -> Document {
    let mut markup = String::new();
    for _ in 0..rng.random_range(1..=4) {
        random_block(rng, 0, &mut markup);
    }
    Document::from_markup(&markup).unwrap()
}

/// Random retains and replaces over `data`. Removed runs may be inserted
/// again further on, so whole elements get relocated and wrappers dropped
/// or added around surviving content.
fn random_transaction(rng: &mut StdRng, data: &LinearData) -> Transaction {
    let old = data.items();
    let mut builder = TransactionBuilder::new();
    let mut removed_runs: Vec<Vec<Item>> = Vec::new();
    let mut offset = 0;

    while offset < old.len() {
        if rng.random_bool(0.7) {
            let length = rng.random_range(1..=8).min(old.len() - offset);
            builder.retain(length);
            offset += length;
            continue;
        }

        let end = match data.matching_close(offset) {
            Some(close) if rng.random_bool(0.5) => close + 1,
            _ => (offset + rng.random_range(0..=3)).min(old.len()),
        };
        let remove = old[offset..end].to_vec();
        offset = end;

        let kind = STRUCTURAL[rng.random_range(0..STRUCTURAL.len())];
        let insert = match rng.random_range(0..6) {
            0 | 1 if !removed_runs.is_empty() => {
                let at = rng.random_range(0..removed_runs.len());
                removed_runs.swap_remove(at)
            }
            0..=2 => Item::text("n"),
            3 => {
                let mut paragraph = vec![Item::open(NodeKind::Paragraph)];
                paragraph.extend(Item::text("p"));
                paragraph.push(Item::close(NodeKind::Paragraph));
                paragraph
            }
            4 => vec![Item::open(kind)],
            _ => vec![Item::close(kind)],
        };
        if !remove.is_empty() {
            removed_runs.push(remove.clone());
        }
        builder.replace(remove, insert);
    }
    builder.build(old.len()).unwrap()
}

#[rstest]
fn test_random_commits_match_rebuild_and_reverse(#[values(1, 7, 42, 1234, 98765)] seed: u64) {
    init_logging();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut committed = 0;

    for _ in 0..30 {
        let mut doc = random_document(&mut rng);
        for _ in 0..20 {
            let tx = random_transaction(&mut rng, doc.data());
            if doc.data().preview(&tx).is_err() {
                continue;
            }
            let before = doc.data().clone();
            let context = format!("seed {seed}, {}\n{tx:?}", before.to_markup());

            let report = doc.commit(&tx);
            assert!(report.is_ok(), "{context}\n{report:?}");
            assert_eq!(doc.verify_tree(), None, "{context}");

            let undo = doc.commit(&tx.reversed());
            assert!(undo.is_ok(), "undo of {context}\n{undo:?}");
            assert_eq!(doc.data(), &before, "{context}");
            assert!(doc.tree().same_structure(&DocumentTree::build(&before)), "{context}");

            doc.commit(&tx).unwrap();
            committed += 1;
        }
    }
    assert!(committed > 0, "seed {seed} produced no applicable transaction");
}
