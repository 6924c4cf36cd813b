//! Tree nodes and content attachments.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{content_hash, ElementId, NodeId};

/// Kind of content attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Paragraph,
    Code,
    Table,
    Image,
    Qa,
}

/// A content fragment re-attached to a tree node after mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub element_id: ElementId,
    pub kind: RefKind,
    /// Markdown payload rendered per kind (fenced code, table rows,
    /// image link, or the paragraph text itself).
    pub markdown: String,
    pub caption: Option<String>,
    pub question: Option<String>,
    pub answer: Option<String>,
    /// Hash of `markdown`, for downstream consumers to verify payloads.
    pub hash: String,
    pub created_at: String,
}

impl ContentRef {
    pub fn new(
        element_id: ElementId,
        kind: RefKind,
        markdown: String,
        caption: Option<String>,
    ) -> Self {
        let hash = content_hash(markdown.as_bytes());
        Self {
            element_id,
            kind,
            markdown,
            caption,
            question: None,
            answer: None,
            hash,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn qa(element_id: ElementId, question: String, answer: String) -> Self {
        let markdown = format!("**Q:** {question}\n\n**A:** {answer}");
        let hash = content_hash(markdown.as_bytes());
        Self {
            element_id,
            kind: RefKind::Qa,
            markdown,
            caption: None,
            question: Some(question),
            answer: Some(answer),
            hash,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// One node of the outline tree. The root is just a node like any other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub title: String,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub content_refs: Vec<ContentRef>,
    #[serde(default)]
    pub order: usize,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl Node {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_children(title: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            title: title.into(),
            children,
            ..Self::default()
        }
    }

    /// Total number of nodes in this subtree, including self.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Node::count).sum::<usize>()
    }

    /// Depth-first search by node id.
    pub fn find(&self, node_id: &str) -> Option<&Node> {
        if self.node_id.as_deref() == Some(node_id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(node_id))
    }

    pub fn find_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        if self.node_id.as_deref() == Some(node_id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(node_id))
    }

    /// All titles in depth-first order, useful in tests and stats.
    pub fn titles(&self) -> Vec<String> {
        let mut out = vec![self.title.clone()];
        for child in &self.children {
            out.extend(child.titles());
        }
        out
    }

    /// Normalize a loosely shaped service response into a node.
    ///
    /// Accepts `{"title": ..., "children": [...]}` trees, a `{"root": ...}`
    /// wrapper, a `{"nodes": [...]}` forest (wrapped under an untitled
    /// root), or a bare string. Unknown shapes become an empty untitled
    /// node rather than an error; the caller decides whether that is fatal.
    pub fn normalize(value: &Value) -> Node {
        match value {
            Value::String(s) => Node::new(s.trim()),
            Value::Object(map) => {
                if let Some(root) = map.get("root") {
                    return Node::normalize(root);
                }
                if let Some(Value::Array(nodes)) = map.get("nodes") {
                    if !map.contains_key("title") {
                        return Node::with_children(
                            "untitled",
                            nodes.iter().map(Node::normalize).collect(),
                        );
                    }
                }
                let title = map
                    .get("title")
                    .or_else(|| map.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("untitled")
                    .trim()
                    .to_string();
                let children = map
                    .get("children")
                    .or_else(|| map.get("nodes"))
                    .and_then(Value::as_array)
                    .map(|items| items.iter().map(Node::normalize).collect())
                    .unwrap_or_default();
                Node {
                    title,
                    children,
                    ..Node::default()
                }
            }
            _ => Node::new("untitled"),
        }
    }

    /// True when the tree carries no information worth keeping.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && (self.title.is_empty() || self.title == "untitled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_plain_tree() {
        let v = json!({"title": "Root", "children": [{"title": "A"}, {"title": "B"}]});
        let node = Node::normalize(&v);
        assert_eq!(node.title, "Root");
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[1].title, "B");
    }

    #[test]
    fn test_normalize_root_wrapper_and_forest() {
        let v = json!({"root": {"title": "R", "children": []}});
        assert_eq!(Node::normalize(&v).title, "R");

        let forest = json!({"nodes": [{"title": "A"}, {"title": "B"}]});
        let node = Node::normalize(&forest);
        assert_eq!(node.title, "untitled");
        assert_eq!(node.children.len(), 2);
    }

    #[test]
    fn test_normalize_junk_is_empty() {
        assert!(Node::normalize(&json!(42)).is_empty());
        assert!(Node::normalize(&json!({})).is_empty());
        assert!(!Node::normalize(&json!({"title": "ok"})).is_empty());
    }

    #[test]
    fn test_find_by_id() {
        let mut tree = Node::with_children(
            "root",
            vec![Node::new("a"), Node::with_children("b", vec![Node::new("c")])],
        );
        crate::tree::assign_node_ids(&mut tree);

        let c_id = tree.children[1].children[0].node_id.clone().unwrap();
        assert_eq!(tree.find(&c_id).unwrap().title, "c");
        tree.find_mut(&c_id)
            .unwrap()
            .content_refs
            .push(ContentRef::new(
                "paragraph_x_00000000".into(),
                RefKind::Paragraph,
                "text".into(),
                None,
            ));
        assert_eq!(tree.find(&c_id).unwrap().content_refs.len(), 1);
    }

    #[test]
    fn test_count_and_titles() {
        let tree = Node::with_children(
            "root",
            vec![Node::new("a"), Node::with_children("b", vec![Node::new("c")])],
        );
        assert_eq!(tree.count(), 4);
        assert_eq!(tree.titles(), vec!["root", "a", "b", "c"]);
    }
}
