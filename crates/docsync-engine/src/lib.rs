//! Transactional editing of a linear document with an incremental tree view.
//!
//! The document is a flat sequence of [`Item`]s: open and close markers for
//! branch nodes with characters between them. A [`Transaction`] describes an
//! edit as a walk over that sequence. Committing it through [`Document`]
//! updates the sequence and replays the same edit on the [`DocumentTree`],
//! emitting [`TreeOperation`]s that reuse every node the edit left intact.

pub mod document;
pub mod error;
pub mod linear;
pub mod modifier;
pub mod transaction;
pub mod tree;

pub use docsync_config::{EngineConfig, TreeSync};
pub use document::{CommitReport, Document};
pub use error::{EngineError, Result};
pub use linear::{AnnotationRef, Attributes, Item, ItemId, LinearData, NodeKind};
pub use modifier::{TreeModifier, TreeOperation};
pub use transaction::{AnnotationAction, LinearRange, Operation, Transaction, TransactionBuilder};
pub use tree::{DocumentTree, Node, NodeId};
