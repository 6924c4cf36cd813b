//! Export of the final tree.
//!
//! Two renditions: a self-describing JSON document for programmatic
//! consumers, and a markmap-flavored markdown outline for humans.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::error::PipelineError;
use crate::pipeline::{RunOutcome, StageStats};
use crate::tree::Node;

pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Serialize)]
struct Generator {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct MindmapDocument<'a> {
    schema_version: &'static str,
    run_name: &'a str,
    created_at: String,
    generator: Generator,
    tags: &'a [String],
    stats: &'a [StageStats],
    tree: Option<&'a Node>,
}

/// Write `<output_dir>/<run>/<run>.mindmap.json` and
/// `<output_dir>/<run>/<run>.markmap.md`, returning the two paths.
pub fn write_outputs(
    output_dir: &Path,
    run_name: &str,
    outcome: &RunOutcome,
) -> Result<(PathBuf, PathBuf), PipelineError> {
    let run_dir = output_dir.join(run_name);
    fs::create_dir_all(&run_dir)?;

    let document = MindmapDocument {
        schema_version: SCHEMA_VERSION,
        run_name,
        created_at: Utc::now().to_rfc3339(),
        generator: Generator {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        },
        tags: &outcome.tags,
        stats: &outcome.stats,
        tree: outcome.tree.as_ref(),
    };

    let json_path = run_dir.join(format!("{run_name}.mindmap.json"));
    let json = serde_json::to_string_pretty(&document)
        .map_err(|e| PipelineError::StageFailed(format!("serialize export: {e}")))?;
    fs::write(&json_path, json)?;

    let markmap_path = run_dir.join(format!("{run_name}.markmap.md"));
    fs::write(&markmap_path, markmap_markdown(run_name, outcome.tree.as_ref()))?;

    info!(
        json = %json_path.display(),
        markmap = %markmap_path.display(),
        "exports written"
    );
    Ok((json_path, markmap_path))
}

/// Render the tree as markmap-compatible markdown: headings by depth,
/// attached content underneath its node.
pub fn markmap_markdown(run_name: &str, tree: Option<&Node>) -> String {
    let mut out = String::new();
    out.push_str(&format!("---\ntitle: {run_name}\nmarkmap:\n  colorFreezeLevel: 2\n---\n\n"));
    match tree {
        Some(tree) => render_node(tree, 1, &mut out),
        None => out.push_str("*(empty document)*\n"),
    }
    out
}

fn render_node(node: &Node, depth: usize, out: &mut String) {
    let level = depth.min(6);
    out.push_str(&format!("{} {}\n\n", "#".repeat(level), node.title));
    for content_ref in &node.content_refs {
        out.push_str(&content_ref.markdown);
        out.push_str("\n\n");
    }
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ContentRef, RefKind};

    fn outcome(tree: Option<Node>) -> RunOutcome {
        RunOutcome {
            tree,
            tags: vec!["alpha".into()],
            stats: Vec::new(),
        }
    }

    #[test]
    fn test_markmap_levels_and_refs() {
        let mut tree = Node::with_children("Root", vec![Node::new("Child")]);
        tree.children[0].content_refs.push(ContentRef::new(
            "paragraph_a_00000000".into(),
            RefKind::Paragraph,
            "body text".into(),
            None,
        ));
        let md = markmap_markdown("demo", Some(&tree));
        assert!(md.contains("# Root"));
        assert!(md.contains("## Child"));
        assert!(md.contains("body text"));
        assert!(md.starts_with("---\ntitle: demo"));
    }

    #[test]
    fn test_write_outputs_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let tree = Node::new("Root");
        let (json_path, markmap_path) =
            write_outputs(dir.path(), "sample", &outcome(Some(tree))).unwrap();
        assert!(json_path.exists());
        assert!(markmap_path.exists());

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed["schema_version"], SCHEMA_VERSION);
        assert_eq!(parsed["run_name"], "sample");
        assert_eq!(parsed["tree"]["title"], "Root");
        assert_eq!(parsed["tags"][0], "alpha");
    }

    #[test]
    fn test_empty_tree_export() {
        let md = markmap_markdown("empty", None);
        assert!(md.contains("(empty document)"));
    }
}
