//! Atomic document blocks.

use serde::{Deserialize, Serialize};

use crate::types::{normalize_ws, short_hash, slug, ElementId};

/// Structural kind of a block.
///
/// Code, tables and images are atomic: they are never split across chunk
/// boundaries and never reused as overlap context.
// Externally tagged on purpose: artifacts are encoded with bincode, which
// cannot round-trip internally tagged enums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading { level: u8 },
    Paragraph,
    Code { language: String },
    Table,
    Image { alt: String, src: String },
}

impl BlockKind {
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            BlockKind::Code { .. } | BlockKind::Table | BlockKind::Image { .. }
        )
    }

    /// Stable kind prefix used in element ids.
    pub fn prefix(&self) -> &'static str {
        match self {
            BlockKind::Heading { .. } => "heading",
            BlockKind::Paragraph => "paragraph",
            BlockKind::Code { .. } => "code",
            BlockKind::Table => "table",
            BlockKind::Image { .. } => "image",
        }
    }
}

/// Scope of content that feeds an element id.
///
/// `Content` keeps ids stable when a block moves to a different section;
/// `ContentAndPath` distinguishes identical text under different headings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScope {
    #[default]
    Content,
    ContentAndPath,
}

/// A generated question/answer pair attached to a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub element_id: ElementId,
    pub question: String,
    pub answer: String,
}

/// One flattened markdown block with its heading-path context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub element_id: ElementId,
    pub kind: BlockKind,
    /// Body text. For code this is the fence interior, for tables the
    /// rendered markdown rows, for images the source URL.
    pub text: String,
    /// Titles of the enclosing headings, outermost first. A heading block
    /// includes its own title as the last entry.
    pub heading_path: Vec<String>,
    pub token_count: usize,
    #[serde(default)]
    pub qa_pairs: Vec<QaPair>,
}

impl Block {
    pub fn is_atomic(&self) -> bool {
        self.kind.is_atomic()
    }

    /// Render the block back to markdown.
    pub fn markdown(&self) -> String {
        match &self.kind {
            BlockKind::Heading { level } => {
                format!("{} {}", "#".repeat(*level as usize), self.text)
            }
            BlockKind::Paragraph => self.text.clone(),
            BlockKind::Code { language } => {
                format!("```{}\n{}\n```", language, self.text)
            }
            BlockKind::Table => self.text.clone(),
            BlockKind::Image { alt, src } => format!("![{}]({})", alt, src),
        }
    }
}

/// Compute the deterministic element id for a block.
///
/// Layout: `<kind>_<slug>_<hash8>`, where the slug is taken from the
/// normalized content and the hash covers the normalized content (plus the
/// heading path under [`IdScope::ContentAndPath`]).
pub fn element_id(
    kind: &BlockKind,
    content: &str,
    heading_path: &[String],
    scope: IdScope,
) -> ElementId {
    let norm = normalize_ws(content);
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"element:");
    hasher.update(norm.as_bytes());
    if scope == IdScope::ContentAndPath && !heading_path.is_empty() {
        hasher.update(b"|path:");
        hasher.update(normalize_ws(&heading_path.join(" / ")).as_bytes());
    }
    let digest = hex::encode(&hasher.finalize().as_bytes()[..4]);
    format!("{}_{}_{}", kind.prefix(), slug(&norm, 8), digest)
}

/// Build a block, filling in its element id and token estimate.
pub fn make_block(
    kind: BlockKind,
    text: String,
    heading_path: Vec<String>,
    scope: IdScope,
) -> Block {
    // Image ids hash the source URL so the same image under two captions
    // still dedups to one element.
    let id_content = match &kind {
        BlockKind::Image { alt, src } => {
            if src.is_empty() {
                alt.clone()
            } else {
                src.clone()
            }
        }
        _ => text.clone(),
    };
    let element_id = element_id(&kind, &id_content, &heading_path, scope);
    let token_count = super::tokens::TokenCounter::estimate(&render_for_tokens(&kind, &text));
    Block {
        element_id,
        kind,
        text,
        heading_path,
        token_count,
        qa_pairs: Vec::new(),
    }
}

fn render_for_tokens(kind: &BlockKind, text: &str) -> String {
    match kind {
        BlockKind::Image { alt, src } => format!("![{}]({})", alt, src),
        _ => text.to_string(),
    }
}
