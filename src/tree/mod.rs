//! Outline tree model.
//!
//! Trees arrive from the generation service in loose JSON shapes, get
//! normalized into [`Node`]s, and then carry deterministic node ids,
//! sibling order and drift-detection fingerprints through the merge,
//! refine and mapping phases.

pub mod id;
pub mod node;

pub use id::{annotate, assign_node_ids};
pub use node::{ContentRef, Node, RefKind};
