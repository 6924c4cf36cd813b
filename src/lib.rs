//! Mindmeld: Concurrent Mindmap Synthesis
//!
//! Transforms long markdown documents into a single hierarchical outline by
//! chunking, per-chunk summarization via an external generation service,
//! semantic clustering, tournament merging, and content re-attachment.
//! Stage outputs are cached per run so interrupted runs resume cheaply.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod exec;
pub mod export;
pub mod logging;
pub mod mapper;
pub mod merge;
pub mod pipeline;
pub mod retry;
pub mod segment;
pub mod service;
pub mod store;
pub mod tree;
pub mod types;
