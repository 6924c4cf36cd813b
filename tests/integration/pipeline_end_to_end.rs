//! Full pipeline runs against the scripted service.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use mindmeld::pipeline::{Step, StepRunner};
use mindmeld::tree::RefKind;

use super::test_utils::{open_store, sample_document, small_config, ScriptedService};

#[tokio::test]
async fn full_run_produces_annotated_tree() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let service = Arc::new(ScriptedService::default());
    let store = open_store(dir.path(), "e2e");

    let runner = StepRunner::new(config, service.clone(), store, false);
    let outcome = runner
        .run(&sample_document(), &Step::plan(false))
        .await
        .unwrap();

    let tree = outcome.tree.expect("final tree");
    assert!(tree.count() >= 1);
    assert!(tree.node_id.is_some());
    assert!(tree.fingerprint.is_some());

    // Every node got an id, an order and a fingerprint.
    fn check(node: &mindmeld::tree::Node) {
        assert!(node.node_id.is_some(), "node {} missing id", node.title);
        assert!(node.fingerprint.is_some());
        for (idx, child) in node.children.iter().enumerate() {
            assert_eq!(child.order, idx);
            check(child);
        }
    }
    check(&tree);

    // The scripted service maps everything onto the root.
    assert!(!tree.content_refs.is_empty());
    let kinds: Vec<RefKind> = tree.content_refs.iter().map(|r| r.kind).collect();
    assert!(kinds.contains(&RefKind::Paragraph));
    assert!(kinds.contains(&RefKind::Code));
    assert!(kinds.contains(&RefKind::Table));
    assert!(kinds.contains(&RefKind::Image));

    // Tags aggregate from the per-chunk summaries.
    assert!(!outcome.tags.is_empty());

    // Every planned stage reported stats, none cached on a fresh run.
    let stages: Vec<&str> = outcome.stats.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(
        stages,
        vec!["segment", "summarize", "cluster", "merge", "refine", "map"]
    );
    assert!(outcome.stats.iter().all(|s| !s.cached));

    assert!(service.summarize_calls.load(Ordering::SeqCst) >= 2);
    assert!(service.refine_calls.load(Ordering::SeqCst) == 1);
}

#[tokio::test]
async fn qa_run_attaches_question_refs() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let service = Arc::new(ScriptedService::default());
    let store = open_store(dir.path(), "e2e-qa");

    let runner = StepRunner::new(config, service.clone(), store, false);
    let outcome = runner
        .run(&sample_document(), &Step::plan(true))
        .await
        .unwrap();

    let tree = outcome.tree.expect("final tree");
    let qa_refs: Vec<_> = tree
        .content_refs
        .iter()
        .filter(|r| r.kind == RefKind::Qa)
        .collect();
    assert!(!qa_refs.is_empty());
    for r in qa_refs {
        assert!(r.question.is_some());
        assert!(r.answer.is_some());
        assert!(r.element_id.starts_with("qa_"));
    }

    assert!(service.question_calls.load(Ordering::SeqCst) >= 1);
    assert!(service.answer_calls.load(Ordering::SeqCst) >= 1);

    let stages: Vec<&str> = outcome.stats.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(stages.first(), Some(&"segment"));
    assert!(stages.contains(&"qa"));
    assert!(stages.contains(&"qa_map"));
}

#[tokio::test]
async fn empty_document_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let service = Arc::new(ScriptedService::default());
    let store = open_store(dir.path(), "empty");

    let runner = StepRunner::new(config, service.clone(), store, false);
    let outcome = runner.run("", &Step::plan(false)).await.unwrap();

    assert!(outcome.tree.is_none());
    assert_eq!(service.total_calls(), 0);
}

#[tokio::test]
async fn subset_of_steps_runs_in_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    let service = Arc::new(ScriptedService::default());
    let store = open_store(dir.path(), "subset");

    let runner = StepRunner::new(config, service.clone(), store, false);
    let outcome = runner
        .run(&sample_document(), &[Step::Segment])
        .await
        .unwrap();

    assert!(outcome.tree.is_none());
    assert_eq!(outcome.stats.len(), 1);
    assert_eq!(service.total_calls(), 0);
}
