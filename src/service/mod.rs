//! Generation Service Boundary
//!
//! Unified interface for the external generation service that produces
//! per-chunk outline trees, merges and refines trees, maps content
//! elements onto nodes, and generates question/answer pairs. The pipeline
//! treats the service as opaque: it speaks typed payloads in, typed
//! payloads out, and all transport and response-shape concerns live behind
//! this trait.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::segment::{Chunk, QaPair};
use crate::tree::{Node, RefKind};
use crate::types::{ElementId, NodeId};

pub use http::HttpGenerationService;

/// Outline produced from one chunk, with topical tags for clustering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub chunk_index: usize,
    pub tree: Node,
    pub tags: Vec<String>,
    /// Token size of the source chunk, carried for stats.
    pub token_count: usize,
    /// Most frequent heading paths in the source chunk, outermost-first,
    /// joined with " / ". Used as a tag fallback when the service returns
    /// none.
    pub top_heading_paths: Vec<String>,
}

/// One element queued for content mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapElement {
    pub element_id: ElementId,
    pub kind: RefKind,
    /// Short human-readable description shown to the service in place of
    /// the full payload.
    pub caption: String,
    pub heading_path: Vec<String>,
    pub source_chunk_index: usize,
}

/// A validated (element, node) assignment returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingPair {
    pub element_id: ElementId,
    pub target_node_id: NodeId,
}

/// Client trait for the generation service.
///
/// Implementations must validate response shapes at this boundary:
/// callers receive normalized trees and mapping pairs with both fields
/// present, never raw service JSON.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Summarize one chunk into a small outline tree plus topical tags.
    async fn summarize_chunk(&self, chunk: &Chunk) -> Result<(Node, Vec<String>), ServiceError>;

    /// Merge two partial trees into one.
    async fn merge_trees(&self, left: &Node, right: &Node) -> Result<Node, ServiceError>;

    /// Restructure the merged tree (deduplicate, rebalance, retitle).
    async fn refine_tree(&self, tree: &Node) -> Result<Node, ServiceError>;

    /// Assign each element to a node of `tree`. Elements the service
    /// cannot place are simply absent from the result.
    async fn map_elements(
        &self,
        tree: &Node,
        elements: &[MapElement],
    ) -> Result<Vec<MappingPair>, ServiceError>;

    /// Generate study questions for one chunk.
    async fn generate_questions(&self, chunk: &Chunk) -> Result<Vec<String>, ServiceError>;

    /// Answer previously generated questions against one chunk. Each
    /// answer names the element id of the block that grounds it.
    async fn answer_questions(
        &self,
        chunk: &Chunk,
        questions: &[String],
    ) -> Result<Vec<QaPair>, ServiceError>;
}
