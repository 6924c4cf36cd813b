//! Document Segmentation
//!
//! Parses a markdown document into atomic blocks (headings, paragraphs,
//! code, tables, images), flattens them with their heading-path context,
//! and regroups them into token-bounded chunks with configurable overlap.
//! Every block carries a deterministic content-derived element id so that
//! repeated runs over the same input produce byte-identical chunks.

pub mod block;
pub mod chunker;
pub mod parser;
pub mod sentence;
pub mod tokens;

pub use block::{Block, BlockKind, IdScope, QaPair};
pub use chunker::{Chunk, ChunkMetadata, Segmenter};
