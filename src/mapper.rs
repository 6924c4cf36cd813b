//! Content mapping: re-attaching document fragments to the final tree.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::exec::ExecutionPool;
use crate::retry::Retrier;
use crate::segment::{Block, BlockKind, Chunk};
use crate::service::{GenerationService, MapElement, MappingPair};
use crate::tree::{ContentRef, Node, RefKind};
use crate::types::{normalize_ws, short_hash, slug, ElementId};

const CAPTION_MAX_LEN: usize = 160;
const MIN_BATCH: usize = 20;
const MAX_BATCH: usize = 80;
const TARGET_ELEMENTS_PER_BATCH: usize = 60;

/// Why an element never reached the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipLog {
    pub no_id: Vec<ElementId>,
    pub dup_id: Vec<ElementId>,
    pub unsupported: Vec<ElementId>,
}

impl SkipLog {
    pub fn total(&self) -> usize {
        self.no_id.len() + self.dup_id.len() + self.unsupported.len()
    }
}

/// Accounting for one mapping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingReport {
    pub queued: usize,
    pub mapped: usize,
    pub unmapped_ids: Vec<ElementId>,
    pub skips: SkipLog,
}

/// Accounting for a question/answer mapping pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaMappingReport {
    pub total: usize,
    pub mapped: usize,
    pub coverage: f64,
}

pub struct ContentMapper {
    service: Arc<dyn GenerationService>,
    retrier: Arc<Retrier>,
    pool: ExecutionPool,
    batch_override: Option<usize>,
}

impl ContentMapper {
    pub fn new(
        service: Arc<dyn GenerationService>,
        retrier: Arc<Retrier>,
        pool: ExecutionPool,
        batch_override: Option<usize>,
    ) -> Self {
        Self {
            service,
            retrier,
            pool,
            batch_override,
        }
    }

    /// Map every supported block onto `tree` and attach content refs to
    /// the chosen nodes. The tree is only mutated after all service calls
    /// have completed.
    pub async fn map_content(
        &self,
        tree: &mut Node,
        chunks: &[Chunk],
    ) -> Result<MappingReport, PipelineError> {
        let mut skips = SkipLog::default();
        let mut queued: Vec<MapElement> = Vec::new();
        let mut blocks_by_id: HashMap<ElementId, &Block> = HashMap::new();
        let mut seen: HashSet<ElementId> = HashSet::new();

        for chunk in chunks {
            for block in &chunk.blocks {
                if matches!(block.kind, BlockKind::Heading { .. }) {
                    skips.unsupported.push(block.element_id.clone());
                    continue;
                }
                if block.element_id.is_empty() {
                    skips.no_id.push(format!("chunk{}:{}", chunk.index, block.token_count));
                    continue;
                }
                if !seen.insert(block.element_id.clone()) {
                    // Overlap blocks show up in two chunks; map them once.
                    skips.dup_id.push(block.element_id.clone());
                    continue;
                }
                blocks_by_id.insert(block.element_id.clone(), block);
                queued.push(MapElement {
                    element_id: block.element_id.clone(),
                    kind: ref_kind(&block.kind),
                    caption: caption_for(block),
                    heading_path: block.heading_path.clone(),
                    source_chunk_index: chunk.index,
                });
            }
        }

        let queued_count = queued.len();
        info!(
            queued = queued_count,
            skipped = skips.total(),
            "content mapping queue built"
        );
        if queued.is_empty() {
            return Ok(MappingReport {
                skips,
                ..MappingReport::default()
            });
        }

        let pairs = self.dispatch(tree, queued).await?;

        // First occurrence wins when the service maps an element twice.
        let mut assigned: Vec<MappingPair> = Vec::new();
        let mut assigned_ids: HashSet<ElementId> = HashSet::new();
        for pair in pairs {
            if !blocks_by_id.contains_key(&pair.element_id) {
                warn!(element_id = %pair.element_id, "service mapped unknown element");
                continue;
            }
            if assigned_ids.insert(pair.element_id.clone()) {
                assigned.push(pair);
            }
        }

        // An assignment only counts once the ref is attached; a pair whose
        // target node is missing leaves its element unmapped.
        let mut attached: HashSet<ElementId> = HashSet::new();
        for pair in &assigned {
            let block = blocks_by_id[&pair.element_id];
            let Some(node) = tree.find_mut(&pair.target_node_id) else {
                debug!(
                    element_id = %pair.element_id,
                    node_id = %pair.target_node_id,
                    "target node not in tree, dropping mapping"
                );
                continue;
            };
            node.content_refs.push(content_ref_for(block));
            attached.insert(pair.element_id.clone());
        }
        let mapped = attached.len();

        let mut unmapped_ids: Vec<ElementId> = blocks_by_id
            .keys()
            .filter(|id| !attached.contains(*id))
            .cloned()
            .collect();
        unmapped_ids.sort_unstable();

        info!(
            queued = queued_count,
            mapped,
            unmapped = unmapped_ids.len(),
            "content mapping complete"
        );
        Ok(MappingReport {
            queued: queued_count,
            mapped,
            unmapped_ids,
            skips,
        })
    }

    /// Map generated question/answer pairs onto the tree.
    pub async fn map_qa(
        &self,
        tree: &mut Node,
        chunks: &[Chunk],
    ) -> Result<QaMappingReport, PipelineError> {
        let mut queued: Vec<MapElement> = Vec::new();
        let mut qa_by_id: HashMap<ElementId, (String, String)> = HashMap::new();

        for chunk in chunks {
            for block in &chunk.blocks {
                for qa in &block.qa_pairs {
                    let id = qa_element_id(&qa.question, &qa.answer);
                    if qa_by_id.contains_key(&id) {
                        continue;
                    }
                    qa_by_id.insert(id.clone(), (qa.question.clone(), qa.answer.clone()));
                    queued.push(MapElement {
                        element_id: id,
                        kind: RefKind::Qa,
                        caption: truncate(&normalize_ws(&qa.question), CAPTION_MAX_LEN),
                        heading_path: block.heading_path.clone(),
                        source_chunk_index: chunk.index,
                    });
                }
            }
        }

        let total = queued.len();
        if total == 0 {
            return Ok(QaMappingReport::default());
        }

        let pairs = self.dispatch(tree, queued).await?;
        let mut mapped = 0usize;
        let mut placed: HashSet<ElementId> = HashSet::new();
        for pair in pairs {
            let Some((question, answer)) = qa_by_id.get(&pair.element_id) else {
                continue;
            };
            if !placed.insert(pair.element_id.clone()) {
                continue;
            }
            if let Some(node) = tree.find_mut(&pair.target_node_id) {
                node.content_refs.push(ContentRef::qa(
                    pair.element_id.clone(),
                    question.clone(),
                    answer.clone(),
                ));
                mapped += 1;
            }
        }

        let coverage = mapped as f64 / total as f64;
        info!(total, mapped, coverage, "qa mapping complete");
        Ok(QaMappingReport {
            total,
            mapped,
            coverage,
        })
    }

    /// Batch the queue and run all batches through the service
    /// concurrently, flattening results in batch order.
    async fn dispatch(
        &self,
        tree: &Node,
        queued: Vec<MapElement>,
    ) -> Result<Vec<MappingPair>, PipelineError> {
        let batch_size = choose_batch_size(queued.len(), self.batch_override);
        let batches: Vec<Vec<MapElement>> = queued
            .chunks(batch_size)
            .map(|b| b.to_vec())
            .collect();
        debug!(
            batches = batches.len(),
            batch_size, "dispatching mapping batches"
        );

        let snapshot = Arc::new(tree.clone());
        let futures: Vec<_> = batches
            .into_iter()
            .map(|batch| {
                let service = self.service.clone();
                let retrier = self.retrier.clone();
                let snapshot = snapshot.clone();
                async move {
                    retrier
                        .call("map_elements", || {
                            let service = service.clone();
                            let snapshot = snapshot.clone();
                            let batch = batch.clone();
                            async move { service.map_elements(&snapshot, &batch).await }
                        })
                        .await
                }
            })
            .collect();

        let results = self.pool.run_indexed(futures).await?;
        Ok(results.into_iter().flatten().collect())
    }
}

/// Batch size heuristic: aim for ~60 elements per batch across 6-10
/// batches, clamped to [20, 80]. Small queues go out as one batch.
pub fn choose_batch_size(n: usize, batch_override: Option<usize>) -> usize {
    if let Some(forced) = batch_override {
        return forced.max(1);
    }
    if n < MIN_BATCH {
        return n.max(1);
    }
    let target_batches =
        ((n as f64 / TARGET_ELEMENTS_PER_BATCH as f64).round() as usize).clamp(6, 10);
    let batch = n.div_ceil(target_batches);
    batch.clamp(MIN_BATCH, MAX_BATCH)
}

fn ref_kind(kind: &BlockKind) -> RefKind {
    match kind {
        BlockKind::Paragraph | BlockKind::Heading { .. } => RefKind::Paragraph,
        BlockKind::Code { .. } => RefKind::Code,
        BlockKind::Table => RefKind::Table,
        BlockKind::Image { .. } => RefKind::Image,
    }
}

/// Short description of a block for the mapping prompt.
fn caption_for(block: &Block) -> String {
    let caption = match &block.kind {
        BlockKind::Image { alt, src } => {
            if alt.is_empty() {
                src.clone()
            } else {
                alt.clone()
            }
        }
        BlockKind::Code { language } => {
            let first = block.text.lines().next().unwrap_or_default();
            if language.is_empty() {
                first.to_string()
            } else {
                format!("{language}: {first}")
            }
        }
        _ => normalize_ws(&block.text),
    };
    let caption = if caption.is_empty() {
        block.heading_path.join(" / ")
    } else {
        caption
    };
    truncate(&caption, CAPTION_MAX_LEN)
}

/// Build the attachment payload for a mapped block.
fn content_ref_for(block: &Block) -> ContentRef {
    let markdown = match &block.kind {
        BlockKind::Image { alt, src } => format!("![{alt}]({src})"),
        BlockKind::Table => block.text.clone(),
        BlockKind::Code { .. } => block.markdown(),
        _ => block.text.clone(),
    };
    let caption = match &block.kind {
        BlockKind::Image { alt, .. } if !alt.is_empty() => Some(alt.clone()),
        _ => None,
    };
    ContentRef::new(
        block.element_id.clone(),
        ref_kind(&block.kind),
        markdown,
        caption,
    )
}

fn qa_element_id(question: &str, answer: &str) -> ElementId {
    let norm = normalize_ws(question);
    let payload = format!("qa:{}|{}", norm, normalize_ws(answer));
    format!("qa_{}_{}", slug(&norm, 8), short_hash(payload.as_bytes()))
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
