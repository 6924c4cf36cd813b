//! Deterministic node identity.
//!
//! Node ids are derived from the title path plus depth and sibling index,
//! so the same tree shape always gets the same ids regardless of when or
//! where it was produced. Fingerprints additionally cover the node's
//! primary content so consumers can detect drift between runs even when
//! the id stayed stable.

use crate::tree::node::Node;
use crate::types::{short_hash, slug, NodeId};

/// Compute the id for a node at `path` (root-inclusive titles) with the
/// given sibling index.
pub fn node_id_for(path: &[String], sibling_index: usize) -> NodeId {
    let joined = path
        .iter()
        .map(|t| if t.is_empty() { "untitled" } else { t.as_str() })
        .collect::<Vec<_>>()
        .join(" / ");
    let depth = path.len().saturating_sub(1);
    let seed = format!("node:{joined}|depth={depth}|sib={sibling_index}");
    format!("{}_{}", slug(&joined, 32), short_hash(seed.as_bytes()))
}

/// Assign ids to every node in the tree, overwriting any present.
pub fn assign_node_ids(root: &mut Node) {
    let mut path = Vec::new();
    assign(root, &mut path, 0);
}

fn assign(node: &mut Node, path: &mut Vec<String>, sibling_index: usize) {
    path.push(node.title.clone());
    node.node_id = Some(node_id_for(path, sibling_index));
    for (idx, child) in node.children.iter_mut().enumerate() {
        assign(child, path, idx);
    }
    path.pop();
}

/// Annotate sibling order and content fingerprints across the tree.
///
/// The fingerprint hashes the lowercased title, the title path and the
/// hash of the first attached content fragment, so it changes when a node
/// is renamed, moved or re-anchored to different content.
pub fn annotate(root: &mut Node) {
    let mut path = Vec::new();
    annotate_inner(root, &mut path, 0);
}

fn annotate_inner(node: &mut Node, path: &mut Vec<String>, sibling_index: usize) {
    path.push(node.title.clone());
    node.order = sibling_index;

    let primary = node
        .content_refs
        .first()
        .map(|r| r.hash.clone())
        .unwrap_or_default();
    let base = format!(
        "fingerprint:{}|{}|{}",
        node.title.to_lowercase(),
        path.join(" / "),
        primary
    );
    node.fingerprint = Some(short_hash(base.as_bytes()));

    for (idx, child) in node.children.iter_mut().enumerate() {
        annotate_inner(child, path, idx);
    }
    path.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::{ContentRef, RefKind};

    fn sample() -> Node {
        Node::with_children(
            "Root",
            vec![
                Node::new("Alpha"),
                Node::with_children("Beta", vec![Node::new("Gamma")]),
            ],
        )
    }

    #[test]
    fn test_ids_deterministic() {
        let mut a = sample();
        let mut b = sample();
        assign_node_ids(&mut a);
        assign_node_ids(&mut b);
        assert_eq!(a, b);
        assert!(a.node_id.is_some());
        assert!(a.children[1].children[0].node_id.is_some());
    }

    #[test]
    fn test_ids_unique_across_siblings() {
        let mut tree = Node::with_children("R", vec![Node::new("same"), Node::new("same")]);
        assign_node_ids(&mut tree);
        assert_ne!(tree.children[0].node_id, tree.children[1].node_id);
    }

    #[test]
    fn test_id_changes_with_path() {
        let a = node_id_for(&["R".into(), "X".into()], 0);
        let b = node_id_for(&["R".into(), "Y".into()], 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_annotate_sets_order() {
        let mut tree = sample();
        annotate(&mut tree);
        assert_eq!(tree.order, 0);
        assert_eq!(tree.children[0].order, 0);
        assert_eq!(tree.children[1].order, 1);
        assert_eq!(tree.children[1].children[0].order, 0);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let mut plain = sample();
        annotate(&mut plain);

        let mut with_content = sample();
        with_content.children[0].content_refs.push(ContentRef::new(
            "paragraph_x_00000000".into(),
            RefKind::Paragraph,
            "attached text".into(),
            None,
        ));
        annotate(&mut with_content);

        assert_ne!(
            plain.children[0].fingerprint,
            with_content.children[0].fingerprint
        );
        // Unrelated siblings keep their fingerprint.
        assert_eq!(
            plain.children[1].fingerprint,
            with_content.children[1].fingerprint
        );
    }
}
