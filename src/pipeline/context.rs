//! Shared state threaded through pipeline steps.

use serde::Serialize;
use serde_json::Value;

use crate::mapper::{MappingReport, QaMappingReport};
use crate::segment::Chunk;
use crate::service::ChunkSummary;
use crate::tree::Node;

/// One line of run accounting, included in the exported document.
#[derive(Debug, Clone, Serialize)]
pub struct StageStats {
    pub stage: String,
    /// True when the step was served from the artifact cache.
    pub cached: bool,
    pub details: Value,
}

/// Mutable state accumulated over one run.
#[derive(Default)]
pub struct RunContext {
    pub text: String,
    pub chunks: Vec<Chunk>,
    pub summaries: Vec<ChunkSummary>,
    /// Clusters as groups of summary indices.
    pub groups: Vec<Vec<usize>>,
    /// One merged tree per cluster.
    pub cluster_trees: Vec<Node>,
    pub final_tree: Option<Node>,
    pub map_report: Option<MappingReport>,
    pub qa_report: Option<QaMappingReport>,
    pub stats: Vec<StageStats>,
}

impl RunContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, stage: &str, cached: bool, details: Value) {
        self.stats.push(StageStats {
            stage: stage.to_string(),
            cached,
            details,
        });
    }

    /// Union of summary tags, first-seen order.
    pub fn tags(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for summary in &self.summaries {
            for tag in &summary.tags {
                if !out.contains(tag) {
                    out.push(tag.clone());
                }
            }
        }
        out
    }
}
