//! Step runner: ordering, caching and accounting.

use std::str::FromStr;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::config::MindmeldConfig;
use crate::error::PipelineError;
use crate::exec::ExecutionPool;
use crate::mapper::ContentMapper;
use crate::retry::Retrier;
use crate::segment::Chunk;
use crate::service::{ChunkSummary, GenerationService};
use crate::store::{load_stage, save_stage, SledArtifactStore};
use crate::tree::{annotate, Node};

use super::context::{RunContext, StageStats};
use super::stages::{self, StageDeps};

/// One pipeline step. Steps are idempotent: a cached artifact short-circuits
/// the computation unless the runner was built with `force`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Segment,
    Qa,
    Summarize,
    Cluster,
    Merge,
    Refine,
    Map,
    QaMap,
}

impl Step {
    pub fn artifact(&self) -> &'static str {
        match self {
            Step::Segment => "chunks",
            Step::Qa => "qa_chunks",
            Step::Summarize => "summaries",
            Step::Cluster => "clusters",
            Step::Merge => "cluster_trees",
            Step::Refine => "final_tree",
            Step::Map => "mapped_tree",
            Step::QaMap => "qa_tree",
        }
    }

    /// Standard step order for a run, QA steps included when enabled.
    pub fn plan(qa: bool) -> Vec<Step> {
        let mut steps = vec![Step::Segment];
        if qa {
            steps.push(Step::Qa);
        }
        steps.extend([Step::Summarize, Step::Cluster, Step::Merge, Step::Refine, Step::Map]);
        if qa {
            steps.push(Step::QaMap);
        }
        steps
    }
}

impl FromStr for Step {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segment" => Ok(Step::Segment),
            "qa" => Ok(Step::Qa),
            "summarize" => Ok(Step::Summarize),
            "cluster" => Ok(Step::Cluster),
            "merge" => Ok(Step::Merge),
            "refine" => Ok(Step::Refine),
            "map" => Ok(Step::Map),
            "qa-map" | "qa_map" => Ok(Step::QaMap),
            other => Err(PipelineError::Config(format!("unknown step: {other}"))),
        }
    }
}

/// Result handed back to the caller after a run.
pub struct RunOutcome {
    pub tree: Option<Node>,
    pub tags: Vec<String>,
    pub stats: Vec<StageStats>,
}

pub struct StepRunner {
    config: MindmeldConfig,
    deps: StageDeps,
    store: SledArtifactStore,
    force: bool,
}

impl StepRunner {
    pub fn new(
        config: MindmeldConfig,
        service: Arc<dyn GenerationService>,
        store: SledArtifactStore,
        force: bool,
    ) -> Self {
        let deps = StageDeps {
            service,
            retrier: Arc::new(Retrier::new(
                config.runtime.max_attempts,
                config.min_spacing(),
            )),
            pool: ExecutionPool::new(config.runtime.max_workers),
        };
        Self {
            config,
            deps,
            store,
            force,
        }
    }

    /// Execute `steps` in order over `text`.
    ///
    /// A step whose artifact exists is loaded instead of recomputed. The
    /// first service failure that survives its retry budget aborts the
    /// run; artifacts from completed steps stay valid for the next
    /// invocation.
    pub async fn run(&self, text: &str, steps: &[Step]) -> Result<RunOutcome, PipelineError> {
        let mut ctx = RunContext::new(text);
        for step in steps {
            info!(step = ?step, run = self.store.run_name(), "running step");
            match step {
                Step::Segment => self.run_segment(&mut ctx)?,
                Step::Qa => self.run_qa(&mut ctx).await?,
                Step::Summarize => self.run_summarize(&mut ctx).await?,
                Step::Cluster => self.run_cluster(&mut ctx)?,
                Step::Merge => self.run_merge(&mut ctx).await?,
                Step::Refine => self.run_refine(&mut ctx).await?,
                Step::Map => self.run_map(&mut ctx).await?,
                Step::QaMap => self.run_qa_map(&mut ctx).await?,
            }
        }

        let mut tree = ctx.final_tree.take();
        if let Some(tree) = tree.as_mut() {
            annotate(tree);
        }
        Ok(RunOutcome {
            tree,
            tags: ctx.tags(),
            stats: ctx.stats,
        })
    }

    fn cached<T: serde::de::DeserializeOwned>(
        &self,
        step: Step,
    ) -> Result<Option<T>, PipelineError> {
        if self.force {
            return Ok(None);
        }
        Ok(load_stage(&self.store, step.artifact())?)
    }

    fn run_segment(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        if let Some(chunks) = self.cached::<Vec<Chunk>>(Step::Segment)? {
            ctx.record(
                "segment",
                true,
                json!({ "chunks": chunks.len() }),
            );
            ctx.chunks = chunks;
            return Ok(());
        }
        let chunks = stages::segment(&self.config.chunk, &ctx.text);
        save_stage(&self.store, Step::Segment.artifact(), &chunks)?;
        let blocks: usize = chunks.iter().map(|c| c.blocks.len()).sum();
        ctx.record(
            "segment",
            false,
            json!({ "chunks": chunks.len(), "blocks": blocks }),
        );
        ctx.chunks = chunks;
        Ok(())
    }

    async fn run_qa(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        if let Some(chunks) = self.cached::<Vec<Chunk>>(Step::Qa)? {
            ctx.record("qa", true, json!({ "chunks": chunks.len() }));
            ctx.chunks = chunks;
            return Ok(());
        }
        let chunks = stages::generate_qa(&self.deps, std::mem::take(&mut ctx.chunks)).await?;
        save_stage(&self.store, Step::Qa.artifact(), &chunks)?;
        let pairs: usize = chunks
            .iter()
            .flat_map(|c| &c.blocks)
            .map(|b| b.qa_pairs.len())
            .sum();
        ctx.record("qa", false, json!({ "qa_pairs": pairs }));
        ctx.chunks = chunks;
        Ok(())
    }

    async fn run_summarize(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        if let Some(summaries) = self.cached::<Vec<ChunkSummary>>(Step::Summarize)? {
            ctx.record("summarize", true, json!({ "summaries": summaries.len() }));
            ctx.summaries = summaries;
            return Ok(());
        }
        let (summaries, tag_fallbacks) = stages::summarize(&self.deps, &ctx.chunks).await?;
        save_stage(&self.store, Step::Summarize.artifact(), &summaries)?;
        ctx.record(
            "summarize",
            false,
            json!({ "summaries": summaries.len(), "tag_fallbacks": tag_fallbacks }),
        );
        ctx.summaries = summaries;
        Ok(())
    }

    fn run_cluster(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        if let Some(groups) = self.cached::<Vec<Vec<usize>>>(Step::Cluster)? {
            ctx.record("cluster", true, json!({ "clusters": groups.len() }));
            ctx.groups = groups;
            return Ok(());
        }
        let groups = stages::cluster_summaries(&self.config.runtime, &ctx.summaries);
        save_stage(&self.store, Step::Cluster.artifact(), &groups)?;
        ctx.record(
            "cluster",
            false,
            json!({
                "clusters": groups.len(),
                "sizes": groups.iter().map(Vec::len).collect::<Vec<_>>(),
            }),
        );
        ctx.groups = groups;
        Ok(())
    }

    async fn run_merge(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        if let Some(trees) = self.cached::<Vec<Node>>(Step::Merge)? {
            ctx.record("merge", true, json!({ "cluster_trees": trees.len() }));
            ctx.cluster_trees = trees;
            return Ok(());
        }
        let trees = stages::merge_clusters(&self.deps, &ctx.summaries, &ctx.groups).await?;
        save_stage(&self.store, Step::Merge.artifact(), &trees)?;
        ctx.record("merge", false, json!({ "cluster_trees": trees.len() }));
        ctx.cluster_trees = trees;
        Ok(())
    }

    async fn run_refine(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        if let Some(tree) = self.cached::<Option<Node>>(Step::Refine)? {
            let nodes = tree.as_ref().map(Node::count).unwrap_or(0);
            ctx.record("refine", true, json!({ "nodes": nodes }));
            ctx.final_tree = tree;
            return Ok(());
        }
        let tree =
            stages::build_final_tree(&self.deps, std::mem::take(&mut ctx.cluster_trees)).await?;
        if tree.is_none() {
            warn!("no tree survived merging; document may be empty");
        }
        save_stage(&self.store, Step::Refine.artifact(), &tree)?;
        let nodes = tree.as_ref().map(Node::count).unwrap_or(0);
        ctx.record("refine", false, json!({ "nodes": nodes }));
        ctx.final_tree = tree;
        Ok(())
    }

    async fn run_map(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        if let Some(tree) = self.cached::<Node>(Step::Map)? {
            let report = load_stage(&self.store, "map_report")?;
            ctx.record("map", true, json!({ "nodes": tree.count() }));
            ctx.final_tree = Some(tree);
            ctx.map_report = report;
            return Ok(());
        }
        let Some(mut tree) = ctx.final_tree.take() else {
            ctx.record("map", false, json!({ "skipped": "no tree" }));
            return Ok(());
        };
        let mapper = ContentMapper::new(
            self.deps.service.clone(),
            self.deps.retrier.clone(),
            self.deps.pool.clone(),
            self.config.runtime.map_batch_size,
        );
        let report = mapper.map_content(&mut tree, &ctx.chunks).await?;
        save_stage(&self.store, Step::Map.artifact(), &tree)?;
        save_stage(&self.store, "map_report", &report)?;
        ctx.record(
            "map",
            false,
            json!({
                "queued": report.queued,
                "mapped": report.mapped,
                "unmapped": report.unmapped_ids.len(),
                "skipped": report.skips.total(),
            }),
        );
        ctx.final_tree = Some(tree);
        ctx.map_report = Some(report);
        Ok(())
    }

    async fn run_qa_map(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        if let Some(tree) = self.cached::<Node>(Step::QaMap)? {
            let report = load_stage(&self.store, "qa_report")?;
            ctx.record("qa_map", true, json!({ "nodes": tree.count() }));
            ctx.final_tree = Some(tree);
            ctx.qa_report = report;
            return Ok(());
        }
        let Some(mut tree) = ctx.final_tree.take() else {
            ctx.record("qa_map", false, json!({ "skipped": "no tree" }));
            return Ok(());
        };
        let mapper = ContentMapper::new(
            self.deps.service.clone(),
            self.deps.retrier.clone(),
            self.deps.pool.clone(),
            self.config.runtime.map_batch_size,
        );
        let report = mapper.map_qa(&mut tree, &ctx.chunks).await?;
        save_stage(&self.store, Step::QaMap.artifact(), &tree)?;
        save_stage(&self.store, "qa_report", &report)?;
        ctx.record(
            "qa_map",
            false,
            json!({
                "total": report.total,
                "mapped": report.mapped,
                "coverage": report.coverage,
            }),
        );
        ctx.final_tree = Some(tree);
        ctx.qa_report = Some(report);
        Ok(())
    }
}
