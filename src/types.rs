//! Shared identifier types and hashing helpers.
//!
//! All identifiers in the pipeline are content-derived: the same input
//! always produces the same id, which is what makes cached partial runs
//! reusable across invocations.

/// Identifier of one document element (paragraph, code block, table, image).
pub type ElementId = String;

/// Identifier of one node in the outline tree.
pub type NodeId = String;

/// Short hex digest (8 chars) of a blake3 hash over `payload`.
pub fn short_hash(payload: &[u8]) -> String {
    let digest = blake3::hash(payload);
    hex::encode(&digest.as_bytes()[..4])
}

/// Full hex digest of a blake3 hash, prefixed with the algorithm name.
///
/// Used for content-ref payload hashes so downstream consumers can verify
/// attachments without knowing how they were produced.
pub fn content_hash(payload: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(payload).to_hex())
}

/// Collapse all runs of whitespace to single spaces and trim.
///
/// Identifier hashing normalizes text first so incidental reflowing of the
/// source document does not change element ids.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased, hyphen-separated slug of `text`, truncated to `max_len`.
pub fn slug(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(max_len);
    let mut prev_hyphen = true;
    for c in text.chars() {
        if out.len() >= max_len {
            break;
        }
        if c.is_alphanumeric() {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
            prev_hyphen = false;
        } else if !prev_hyphen {
            out.push('-');
            prev_hyphen = true;
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed
    }
}
