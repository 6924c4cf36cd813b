//! Caching and resume behavior across repeated runs.

use std::sync::Arc;

use mindmeld::pipeline::{Step, StepRunner};

use super::test_utils::{open_store, sample_document, small_config, ScriptedService};

#[tokio::test]
async fn second_run_is_served_entirely_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document();

    let first = Arc::new(ScriptedService::default());
    let runner = StepRunner::new(
        small_config(dir.path()),
        first.clone(),
        open_store(dir.path(), "resume"),
        false,
    );
    let outcome_a = runner.run(&doc, &Step::plan(false)).await.unwrap();
    assert!(first.total_calls() > 0);
    drop(runner);

    // Same run name, fresh service: every step loads its artifact.
    let second = Arc::new(ScriptedService::default());
    let runner = StepRunner::new(
        small_config(dir.path()),
        second.clone(),
        open_store(dir.path(), "resume"),
        false,
    );
    let outcome_b = runner.run(&doc, &Step::plan(false)).await.unwrap();

    assert_eq!(second.total_calls(), 0, "cached run must not call service");
    assert!(outcome_b.stats.iter().all(|s| s.cached));

    let tree_a = outcome_a.tree.unwrap();
    let tree_b = outcome_b.tree.unwrap();
    assert_eq!(tree_a.titles(), tree_b.titles());
    assert_eq!(tree_a.node_id, tree_b.node_id);
}

#[tokio::test]
async fn force_recomputes_every_step() {
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document();

    let first = Arc::new(ScriptedService::default());
    let runner = StepRunner::new(
        small_config(dir.path()),
        first.clone(),
        open_store(dir.path(), "forced"),
        false,
    );
    runner.run(&doc, &Step::plan(false)).await.unwrap();
    let baseline = first.total_calls();
    assert!(baseline > 0);
    drop(runner);

    let second = Arc::new(ScriptedService::default());
    let runner = StepRunner::new(
        small_config(dir.path()),
        second.clone(),
        open_store(dir.path(), "forced"),
        true,
    );
    let outcome = runner.run(&doc, &Step::plan(false)).await.unwrap();

    assert_eq!(second.total_calls(), baseline);
    assert!(outcome.stats.iter().all(|s| !s.cached));
}

#[tokio::test]
async fn different_run_names_do_not_share_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document();

    let first = Arc::new(ScriptedService::default());
    let runner = StepRunner::new(
        small_config(dir.path()),
        first.clone(),
        open_store(dir.path(), "run-a"),
        false,
    );
    runner.run(&doc, &Step::plan(false)).await.unwrap();
    drop(runner);

    let second = Arc::new(ScriptedService::default());
    let runner = StepRunner::new(
        small_config(dir.path()),
        second.clone(),
        open_store(dir.path(), "run-b"),
        false,
    );
    runner.run(&doc, &Step::plan(false)).await.unwrap();

    assert_eq!(second.total_calls(), first.total_calls());
}

#[tokio::test]
async fn partial_artifacts_resume_midway() {
    let dir = tempfile::tempdir().unwrap();
    let doc = sample_document();

    // Seed only the early stages.
    let first = Arc::new(ScriptedService::default());
    let runner = StepRunner::new(
        small_config(dir.path()),
        first.clone(),
        open_store(dir.path(), "partial"),
        false,
    );
    runner
        .run(&doc, &[Step::Segment, Step::Summarize])
        .await
        .unwrap();
    assert!(first.total_calls() > 0);
    drop(runner);

    // A full run afterwards reuses them and only pays for the rest.
    let second = Arc::new(ScriptedService::default());
    let runner = StepRunner::new(
        small_config(dir.path()),
        second.clone(),
        open_store(dir.path(), "partial"),
        false,
    );
    let outcome = runner.run(&doc, &Step::plan(false)).await.unwrap();

    assert!(outcome.tree.is_some());
    let cached: Vec<&str> = outcome
        .stats
        .iter()
        .filter(|s| s.cached)
        .map(|s| s.stage.as_str())
        .collect();
    assert_eq!(cached, vec!["segment", "summarize"]);
    // No summarize traffic the second time around.
    assert_eq!(
        second.summarize_calls.load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}
