//! Pairwise tournament merging of partial trees.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::exec::ExecutionPool;
use crate::retry::Retrier;
use crate::service::GenerationService;
use crate::tree::Node;

/// Reduces a set of partial trees to one by repeated pairwise merges.
///
/// Each round pairs trees by position; pairs merge concurrently and an odd
/// tree carries over unchanged. Rounds repeat until one tree remains, so
/// N trees cost N-1 service calls regardless of shape.
pub struct MergeReducer {
    service: Arc<dyn GenerationService>,
    retrier: Arc<Retrier>,
    pool: ExecutionPool,
}

impl MergeReducer {
    pub fn new(
        service: Arc<dyn GenerationService>,
        retrier: Arc<Retrier>,
        pool: ExecutionPool,
    ) -> Self {
        Self {
            service,
            retrier,
            pool,
        }
    }

    /// Merge all trees down to one. Empty input yields `None`; a single
    /// tree is returned as-is without any service call.
    pub async fn merge_all(&self, trees: Vec<Node>) -> Result<Option<Node>, PipelineError> {
        let mut trees: Vec<Node> = trees.into_iter().filter(|t| !t.is_empty()).collect();
        if trees.is_empty() {
            return Ok(None);
        }

        let mut round = 0usize;
        while trees.len() > 1 {
            round += 1;
            debug!(round, trees = trees.len(), "starting merge round");

            let mut iter = trees.into_iter();
            let mut pairs = Vec::new();
            let mut carry = None;
            while let Some(left) = iter.next() {
                match iter.next() {
                    Some(right) => pairs.push((left, right)),
                    None => carry = Some(left),
                }
            }

            let futures: Vec<_> = pairs
                .into_iter()
                .map(|(left, right)| {
                    let service = self.service.clone();
                    let retrier = self.retrier.clone();
                    async move {
                        retrier
                            .call("merge_trees", || {
                                let service = service.clone();
                                let left = left.clone();
                                let right = right.clone();
                                async move { service.merge_trees(&left, &right).await }
                            })
                            .await
                    }
                })
                .collect();

            let mut merged = self.pool.run_indexed(futures).await?;
            if let Some(odd) = carry {
                merged.push(odd);
            }
            trees = merged;
        }

        info!(rounds = round, "merge tournament complete");
        Ok(trees.pop())
    }

    /// One refinement pass over the merged tree.
    pub async fn refine(&self, tree: &Node) -> Result<Node, PipelineError> {
        let service = self.service.clone();
        let tree = tree.clone();
        self.retrier
            .call("refine_tree", move || {
                let service = service.clone();
                let tree = tree.clone();
                async move { service.refine_tree(&tree).await }
            })
            .await
    }
}
