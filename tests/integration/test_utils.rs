//! Shared fixtures for integration tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mindmeld::config::MindmeldConfig;
use mindmeld::error::ServiceError;
use mindmeld::segment::{Chunk, QaPair};
use mindmeld::service::{GenerationService, MapElement, MappingPair};
use mindmeld::store::SledArtifactStore;
use mindmeld::tree::Node;

/// Deterministic scripted service: summaries become one-node trees named
/// after the chunk's dominant heading, merges concatenate, mapping places
/// every element on the root node. All call counts are observable so
/// tests can assert cache behavior.
#[derive(Default)]
pub struct ScriptedService {
    pub summarize_calls: AtomicUsize,
    pub merge_calls: AtomicUsize,
    pub refine_calls: AtomicUsize,
    pub map_calls: AtomicUsize,
    pub question_calls: AtomicUsize,
    pub answer_calls: AtomicUsize,
}

impl ScriptedService {
    pub fn total_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
            + self.merge_calls.load(Ordering::SeqCst)
            + self.refine_calls.load(Ordering::SeqCst)
            + self.map_calls.load(Ordering::SeqCst)
            + self.question_calls.load(Ordering::SeqCst)
            + self.answer_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn summarize_chunk(&self, chunk: &Chunk) -> Result<(Node, Vec<String>), ServiceError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        let title = chunk
            .blocks
            .iter()
            .find(|b| !b.heading_path.is_empty())
            .map(|b| b.heading_path[0].clone())
            .unwrap_or_else(|| format!("chunk {}", chunk.index));
        let tags = vec![title.to_lowercase()];
        Ok((Node::new(title), tags))
    }

    async fn merge_trees(&self, left: &Node, right: &Node) -> Result<Node, ServiceError> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        // Fold right's branches into left rather than nesting forever.
        let mut merged = left.clone();
        if merged.children.is_empty() && merged.title != right.title {
            return Ok(Node::with_children(
                "Document",
                vec![left.clone(), right.clone()],
            ));
        }
        merged.children.push(right.clone());
        Ok(merged)
    }

    async fn refine_tree(&self, tree: &Node) -> Result<Node, ServiceError> {
        self.refine_calls.fetch_add(1, Ordering::SeqCst);
        Ok(tree.clone())
    }

    async fn map_elements(
        &self,
        tree: &Node,
        elements: &[MapElement],
    ) -> Result<Vec<MappingPair>, ServiceError> {
        self.map_calls.fetch_add(1, Ordering::SeqCst);
        let root = tree
            .node_id
            .clone()
            .ok_or_else(|| ServiceError::Other("tree has no node ids".into()))?;
        Ok(elements
            .iter()
            .map(|e| MappingPair {
                element_id: e.element_id.clone(),
                target_node_id: root.clone(),
            })
            .collect())
    }

    async fn generate_questions(&self, chunk: &Chunk) -> Result<Vec<String>, ServiceError> {
        self.question_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![format!("What is covered in part {}?", chunk.index)])
    }

    async fn answer_questions(
        &self,
        chunk: &Chunk,
        questions: &[String],
    ) -> Result<Vec<QaPair>, ServiceError> {
        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        let element_id = chunk
            .blocks
            .iter()
            .find(|b| !b.is_atomic())
            .map(|b| b.element_id.clone())
            .unwrap_or_default();
        Ok(questions
            .iter()
            .map(|q| QaPair {
                element_id: element_id.clone(),
                question: q.clone(),
                answer: format!("It covers: {q}"),
            })
            .collect())
    }
}

/// A document with three topical sections, code, a table and an image.
pub fn sample_document() -> String {
    let mut doc = String::new();
    doc.push_str("# Storage Engine\n\n");
    doc.push_str(&filler("storage", 40));
    doc.push_str("\n\n```rust\nfn flush(memtable: &MemTable) {}\n```\n\n");
    doc.push_str("## Compaction\n\n");
    doc.push_str(&filler("compaction", 40));
    doc.push_str("\n\n# Query Planner\n\n");
    doc.push_str(&filler("planner", 40));
    doc.push_str("\n\n| stage | cost |\n| --- | --- |\n| scan | high |\n\n");
    doc.push_str("# Networking\n\n");
    doc.push_str(&filler("network", 40));
    doc.push_str("\n\n![cluster topology](img/topology.png)\n");
    doc
}

fn filler(topic: &str, words: usize) -> String {
    (0..words)
        .map(|i| format!("{topic}{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn small_config(dir: &Path) -> MindmeldConfig {
    let mut config = MindmeldConfig::default();
    config.io.output_dir = dir.to_path_buf();
    config.chunk.max_tokens = 120;
    config.chunk.overlap_tokens = 20;
    config.runtime.max_workers = 4;
    config.runtime.max_attempts = 2;
    config.runtime.min_spacing_ms = 0;
    config
}

pub fn open_store(dir: &Path, run: &str) -> SledArtifactStore {
    SledArtifactStore::open(&dir.join("artifacts"), run).expect("open store")
}
