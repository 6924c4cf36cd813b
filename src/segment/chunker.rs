//! Token-bounded chunk assembly.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::block::{make_block, Block, BlockKind, IdScope};
use super::parser::parse_blocks;
use super::sentence::split_by_tokens;

/// Summary facts about one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub token_count: usize,
    pub block_count: usize,
    /// Set when a single atomic block exceeded the token budget and was
    /// emitted alone rather than split.
    pub oversized: bool,
}

/// A contiguous run of blocks within the token budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub blocks: Vec<Block>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Render the chunk back to markdown for service payloads.
    pub fn markdown(&self) -> String {
        self.blocks
            .iter()
            .map(Block::markdown)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Distinct heading paths covered by this chunk, in first-seen order.
    pub fn heading_paths(&self) -> Vec<Vec<String>> {
        let mut seen = Vec::new();
        for block in &self.blocks {
            if !block.heading_path.is_empty() && !seen.contains(&block.heading_path) {
                seen.push(block.heading_path.clone());
            }
        }
        seen
    }
}

/// Splits a markdown document into token-bounded chunks.
///
/// Greedy accumulation in document order; when a block would overflow the
/// budget the chunk is closed and a tail window of recent non-atomic blocks
/// is carried into the next chunk as overlap context.
pub struct Segmenter {
    max_tokens: usize,
    overlap_tokens: usize,
    id_scope: IdScope,
}

impl Segmenter {
    pub fn new(max_tokens: usize, overlap_tokens: usize, id_scope: IdScope) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
            overlap_tokens,
            id_scope,
        }
    }

    /// Segment `text` into chunks. Empty or blank input yields no chunks.
    pub fn segment(&self, text: &str) -> Vec<Chunk> {
        let parsed = parse_blocks(text, self.id_scope);
        let blocks = self.expand_oversized_paragraphs(parsed);

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current: Vec<Block> = Vec::new();
        let mut current_tokens = 0usize;

        for block in blocks {
            if block.is_atomic() && block.token_count > self.max_tokens {
                // An indivisible block over budget travels alone.
                if !current.is_empty() {
                    push_chunk(&mut chunks, std::mem::take(&mut current), false);
                    current_tokens = 0;
                }
                debug!(
                    element_id = %block.element_id,
                    tokens = block.token_count,
                    "atomic block exceeds chunk budget, emitting oversized chunk"
                );
                push_chunk(&mut chunks, vec![block], true);
                continue;
            }

            if current_tokens + block.token_count > self.max_tokens && !current.is_empty() {
                let closed = std::mem::take(&mut current);
                let overlap = self.overlap_window(&closed);
                current_tokens = overlap.iter().map(|b| b.token_count).sum();
                push_chunk(&mut chunks, closed, false);
                current = overlap;
            }

            current_tokens += block.token_count;
            current.push(block);
        }

        if !current.is_empty() {
            push_chunk(&mut chunks, current, false);
        }

        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.index = i;
        }
        chunks
    }

    /// Replace any paragraph over budget with sentence-aligned sub-blocks
    /// that inherit its heading path.
    fn expand_oversized_paragraphs(&self, blocks: Vec<Block>) -> Vec<Block> {
        let mut out = Vec::with_capacity(blocks.len());
        for block in blocks {
            let splittable =
                block.kind == BlockKind::Paragraph && block.token_count > self.max_tokens;
            if !splittable {
                out.push(block);
                continue;
            }
            debug!(
                element_id = %block.element_id,
                tokens = block.token_count,
                "splitting oversized paragraph on sentence boundaries"
            );
            for piece in split_by_tokens(&block.text, self.max_tokens) {
                out.push(make_block(
                    BlockKind::Paragraph,
                    piece,
                    block.heading_path.clone(),
                    self.id_scope,
                ));
            }
        }
        out
    }

    /// Tail window of a closed chunk reused as context in the next chunk.
    /// Atomic blocks are skipped; the window grows backwards until it holds
    /// at least `overlap_tokens`.
    fn overlap_window(&self, closed: &[Block]) -> Vec<Block> {
        if self.overlap_tokens == 0 {
            return Vec::new();
        }
        let mut window: Vec<Block> = Vec::new();
        let mut tokens = 0usize;
        for block in closed.iter().rev() {
            if block.is_atomic() {
                continue;
            }
            tokens += block.token_count;
            window.insert(0, block.clone());
            if tokens >= self.overlap_tokens {
                break;
            }
        }
        window
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, blocks: Vec<Block>, oversized: bool) {
    if blocks.is_empty() {
        return;
    }
    let token_count = blocks.iter().map(|b| b.token_count).sum();
    let block_count = blocks.len();
    chunks.push(Chunk {
        index: 0,
        blocks,
        metadata: ChunkMetadata {
            token_count,
            block_count,
            oversized,
        },
    });
}
