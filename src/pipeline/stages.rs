//! Stage computations.
//!
//! Pure stage logic, separated from caching and ordering concerns which
//! live in the runner. Every function here is deterministic given its
//! inputs and the service's responses.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cluster;
use crate::config::{ChunkConfig, RuntimeConfig};
use crate::error::PipelineError;
use crate::exec::ExecutionPool;
use crate::merge::MergeReducer;
use crate::retry::Retrier;
use crate::segment::{Chunk, Segmenter};
use crate::service::{ChunkSummary, GenerationService};
use crate::tree::{assign_node_ids, Node};

/// Shared handles every service-facing stage needs.
pub struct StageDeps {
    pub service: Arc<dyn GenerationService>,
    pub retrier: Arc<Retrier>,
    pub pool: ExecutionPool,
}

impl StageDeps {
    fn reducer(&self) -> MergeReducer {
        MergeReducer::new(self.service.clone(), self.retrier.clone(), self.pool.clone())
    }
}

/// Segment the document into chunks.
pub fn segment(config: &ChunkConfig, text: &str) -> Vec<Chunk> {
    let segmenter = Segmenter::new(config.max_tokens, config.overlap_tokens, config.id_scope);
    let chunks = segmenter.segment(text);
    info!(chunks = chunks.len(), "segmentation complete");
    chunks
}

/// Generate question/answer pairs for every chunk and attach them to the
/// blocks that ground the answers. Unknown element ids in answers are
/// dropped.
pub async fn generate_qa(
    deps: &StageDeps,
    chunks: Vec<Chunk>,
) -> Result<Vec<Chunk>, PipelineError> {
    let futures: Vec<_> = chunks
        .into_iter()
        .map(|mut chunk| {
            let service = deps.service.clone();
            let retrier = deps.retrier.clone();
            async move {
                let questions = {
                    let service = service.clone();
                    let chunk_ref = chunk.clone();
                    retrier
                        .call("generate_questions", move || {
                            let service = service.clone();
                            let chunk = chunk_ref.clone();
                            async move { service.generate_questions(&chunk).await }
                        })
                        .await?
                };
                if questions.is_empty() {
                    return Ok(chunk);
                }
                let answers = {
                    let service = service.clone();
                    let chunk_ref = chunk.clone();
                    let questions = questions.clone();
                    retrier
                        .call("answer_questions", move || {
                            let service = service.clone();
                            let chunk = chunk_ref.clone();
                            let questions = questions.clone();
                            async move { service.answer_questions(&chunk, &questions).await }
                        })
                        .await?
                };
                let mut attached = 0usize;
                for qa in answers {
                    if let Some(block) = chunk
                        .blocks
                        .iter_mut()
                        .find(|b| b.element_id == qa.element_id)
                    {
                        block.qa_pairs.push(qa);
                        attached += 1;
                    }
                }
                debug!(chunk = chunk.index, attached, "qa pairs attached");
                Ok(chunk)
            }
        })
        .collect();

    deps.pool.run_indexed(futures).await
}

/// Summarize every chunk concurrently, preserving chunk order.
///
/// Returns the summaries plus the number of chunks whose tags came from
/// the heading-path fallback because the service returned none.
pub async fn summarize(
    deps: &StageDeps,
    chunks: &[Chunk],
) -> Result<(Vec<ChunkSummary>, usize), PipelineError> {
    let futures: Vec<_> = chunks
        .iter()
        .map(|chunk| {
            let service = deps.service.clone();
            let retrier = deps.retrier.clone();
            let chunk = chunk.clone();
            async move {
                let (tree, tags) = {
                    let chunk_ref = chunk.clone();
                    retrier
                        .call("summarize_chunk", move || {
                            let service = service.clone();
                            let chunk = chunk_ref.clone();
                            async move { service.summarize_chunk(&chunk).await }
                        })
                        .await?
                };
                let top_heading_paths: Vec<String> = chunk
                    .heading_paths()
                    .into_iter()
                    .take(3)
                    .map(|p| p.join(" / "))
                    .collect();
                Ok(ChunkSummary {
                    chunk_index: chunk.index,
                    tree,
                    tags,
                    token_count: chunk.metadata.token_count,
                    top_heading_paths,
                })
            }
        })
        .collect();

    let mut summaries = deps.pool.run_indexed(futures).await?;

    let mut fallbacks = 0usize;
    for summary in &mut summaries {
        if summary.tags.is_empty() {
            fallbacks += 1;
            summary.tags = if summary.top_heading_paths.is_empty() {
                vec![summary.tree.title.clone()]
            } else {
                summary.top_heading_paths.clone()
            };
        }
    }
    info!(
        summaries = summaries.len(),
        tag_fallbacks = fallbacks,
        "summarization complete"
    );
    Ok((summaries, fallbacks))
}

/// Group summaries by topical similarity. Features come from each chunk's
/// heading paths and tags.
pub fn cluster_summaries(config: &RuntimeConfig, summaries: &[ChunkSummary]) -> Vec<Vec<usize>> {
    let features: Vec<String> = summaries
        .iter()
        .map(|s| {
            format!("{} {}", s.top_heading_paths.join(" "), s.tags.join(" "))
                .trim()
                .to_string()
        })
        .collect();
    cluster::cluster(&features, config.cluster_count)
}

/// Merge each cluster's summary trees down to one tree per cluster.
///
/// Clusters run sequentially; the pairwise merges inside a cluster run
/// concurrently. Clusters that collapse to nothing are dropped.
pub async fn merge_clusters(
    deps: &StageDeps,
    summaries: &[ChunkSummary],
    groups: &[Vec<usize>],
) -> Result<Vec<Node>, PipelineError> {
    let reducer = deps.reducer();
    let mut cluster_trees = Vec::with_capacity(groups.len());
    for (i, group) in groups.iter().enumerate() {
        let trees: Vec<Node> = group
            .iter()
            .filter_map(|&idx| summaries.get(idx))
            .map(|s| s.tree.clone())
            .collect();
        debug!(cluster = i, trees = trees.len(), "merging cluster");
        if let Some(tree) = reducer.merge_all(trees).await? {
            cluster_trees.push(tree);
        }
    }
    info!(cluster_trees = cluster_trees.len(), "cluster merge complete");
    Ok(cluster_trees)
}

/// Merge the per-cluster trees into one, refine it, and assign node ids.
pub async fn build_final_tree(
    deps: &StageDeps,
    cluster_trees: Vec<Node>,
) -> Result<Option<Node>, PipelineError> {
    let reducer = deps.reducer();
    let Some(merged) = reducer.merge_all(cluster_trees).await? else {
        return Ok(None);
    };
    let mut refined = reducer.refine(&merged).await?;
    assign_node_ids(&mut refined);
    info!(nodes = refined.count(), "final tree built");
    Ok(Some(refined))
}
