//! # Document
//!
//! Owns the linear data and the tree and keeps them in step. Callers change a
//! document only through [`Document::commit`] (or wholesale through
//! [`Document::replace_data`]); everything else is read-only.
//!
//! A commit is all-or-nothing. The transaction is checked against the live
//! data and the complete new sequence is computed and validated before either
//! representation changes. If the tree modifier then fails, the tree is
//! rebuilt from the untouched linear data and the error is returned.

use std::ops::Range;
use std::path::Path;

use docsync_config::{EngineConfig, TreeSync};

use crate::error::Result;
use crate::linear::{Item, LinearData};
use crate::modifier::{ModifierState, TreeModifier, TreeOperation};
use crate::transaction::Transaction;
use crate::tree::DocumentTree;

/// What a successful commit did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    /// Document version after the commit
    pub version: u64,
    /// Tree operations in the order they were applied. Empty when the tree
    /// was rebuilt instead.
    pub tree_operations: Vec<TreeOperation>,
    /// New-sequence ranges touched by the transaction
    pub changed: Vec<Range<usize>>,
}

#[derive(Debug, Clone)]
pub struct Document {
    data: LinearData,
    tree: DocumentTree,
    config: EngineConfig,
    version: u64,
    last_state: Option<ModifierState>,
}

impl Document {
    pub fn new(items: Vec<Item>) -> Result<Self> {
        Self::with_config(items, EngineConfig::default())
    }

    pub fn with_config(items: Vec<Item>, config: EngineConfig) -> Result<Self> {
        let data = LinearData::new(items)?;
        let tree = DocumentTree::build(&data);
        Ok(Self {
            data,
            tree,
            config,
            version: 0,
            last_state: None,
        })
    }

    pub fn from_markup(markup: &str) -> Result<Self> {
        Self::new(LinearData::from_markup(markup)?.items().to_vec())
    }

    pub fn data(&self) -> &LinearData {
        &self.data
    }

    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bumped by every successful commit or data replacement
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Cursor and adjustment state of the most recent tree modifier pass
    pub fn last_modifier_state(&self) -> Option<&ModifierState> {
        self.last_state.as_ref()
    }

    /// Apply `transaction` to the linear data and bring the tree up to date
    pub fn commit(&mut self, transaction: &Transaction) -> Result<CommitReport> {
        let items = self.data.preview(transaction)?;

        let tree_operations = match self.config.tree_sync {
            TreeSync::Incremental => self.modify_tree(transaction)?,
            TreeSync::Rebuild => Vec::new(),
        };

        self.data.replace_validated(items);
        match self.config.tree_sync {
            TreeSync::Rebuild => self.tree = DocumentTree::build(&self.data),
            TreeSync::Incremental if self.config.verify_commits => {
                let rebuilt = DocumentTree::build(&self.data);
                if let Some(path) = self.tree.first_difference(&rebuilt) {
                    log::warn!(
                        "Incremental tree diverged from rebuild at {path:?} in commit {}; using the rebuilt tree",
                        self.version + 1
                    );
                    self.tree = rebuilt;
                }
            }
            TreeSync::Incremental => {}
        }

        self.version += 1;
        let changed = transaction.modified_ranges();
        log::debug!(
            "Committed version {}: {} operations, {} tree operations, {} items",
            self.version,
            transaction.operations().len(),
            tree_operations.len(),
            self.data.len()
        );

        Ok(CommitReport {
            version: self.version,
            tree_operations,
            changed,
        })
    }

    fn modify_tree(&mut self, transaction: &Transaction) -> Result<Vec<TreeOperation>> {
        let (result, state) = {
            let mut modifier = TreeModifier::new(&mut self.tree, transaction)?;
            match modifier.complete() {
                Ok(()) => {
                    let outcome = modifier.into_outcome();
                    (Ok(outcome.operations), outcome.state)
                }
                Err(err) => {
                    let state = modifier.state();
                    (Err(err), state)
                }
            }
        };

        if let Err(err) = &result {
            log::warn!("Tree modifier failed, rebuilding tree: {err}");
            self.tree = DocumentTree::build(&self.data);
            if let Some(dir) = &self.config.dump_dir {
                self.write_failure_dump(dir, &err.to_string(), &state, transaction);
            }
        }
        if self.config.keep_modifier_state {
            self.last_state = Some(state);
        }
        result
    }

    fn write_failure_dump(&self, dir: &Path, error: &str, state: &ModifierState, transaction: &Transaction) {
        let path = dir.join(format!("commit-failure-v{}.txt", self.version + 1));
        let mut contents = format!("error: {error}\n\n");
        contents.push_str("operations:\n");
        for op in transaction.operations() {
            contents.push_str(&format!("  {op:?}\n"));
        }
        contents.push_str("\nmodifier:\n");
        contents.push_str(&state.dump());
        contents.push_str("\ndocument:\n");
        contents.push_str(&self.dump());

        let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, contents));
        match written {
            Ok(()) => log::debug!("Wrote commit failure dump to {}", path.display()),
            Err(err) => log::warn!("Could not write commit failure dump to {}: {err}", path.display()),
        }
    }

    /// Throw the tree away and build it again from the linear data
    pub fn rebuild_tree(&mut self) {
        self.tree = DocumentTree::build(&self.data);
        log::debug!("Rebuilt tree for version {} ({} items)", self.version, self.data.len());
    }

    /// Swap in new linear data wholesale and rebuild the tree for it
    pub fn replace_data(&mut self, items: Vec<Item>) -> Result<()> {
        self.data = LinearData::new(items)?;
        self.version += 1;
        self.last_state = None;
        self.rebuild_tree();
        Ok(())
    }

    /// Path of the first node where the tree differs from a fresh rebuild
    pub fn verify_tree(&self) -> Option<Vec<usize>> {
        self.tree.first_difference(&DocumentTree::build(&self.data))
    }

    /// Deterministic rendering of the document for golden tests and failure reports
    pub fn dump(&self) -> String {
        let mut out = format!("version: {}\n", self.version);
        out.push_str(&format!("data: {}\n", self.data.to_markup()));
        out.push_str("tree:\n");
        for line in self.tree.dump().lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        if let Some(state) = &self.last_state {
            out.push_str("modifier:\n");
            for line in state.dump().lines() {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}
