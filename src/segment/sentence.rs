//! Sentence-aware text splitting for oversized paragraphs.

use unicode_segmentation::UnicodeSegmentation;

use super::tokens::TokenCounter;

/// Split `text` into pieces of at most `max_tokens`, keeping sentences
/// intact. A single sentence longer than the budget becomes its own piece.
pub fn split_by_tokens(text: &str, max_tokens: usize) -> Vec<String> {
    let max = max_tokens.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    for sentence in text.unicode_sentences() {
        let tokens = TokenCounter::estimate(sentence);
        if current_tokens + tokens > max && !current.trim().is_empty() {
            pieces.push(current.trim().to_string());
            current.clear();
            current_tokens = 0;
        }
        current.push_str(sentence);
        current_tokens += tokens;
    }
    if !current.trim().is_empty() {
        pieces.push(current.trim().to_string());
    }
    pieces
}
