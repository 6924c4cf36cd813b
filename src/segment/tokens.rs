//! Token count estimation.
//!
//! The pipeline does not ship a model tokenizer; chunk budgets only need a
//! stable approximation. ASCII text averages ~4 chars per token, CJK
//! scripts ~2 chars per token.

pub struct TokenCounter;

impl TokenCounter {
    /// Estimate token count for `text`.
    pub fn estimate(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        // Fast path for pure ASCII (the common case).
        if text.is_ascii() {
            return text.len().div_ceil(4);
        }

        let mut char_count = 0usize;
        let mut cjk_count = 0usize;
        for c in text.chars() {
            char_count += 1;
            if is_cjk_char(c) {
                cjk_count += 1;
            }
        }

        if cjk_count > 0 {
            let non_cjk = char_count - cjk_count;
            (cjk_count / 2).max(1) + non_cjk / 4
        } else {
            char_count.div_ceil(4)
        }
    }
}

#[inline]
fn is_cjk_char(c: char) -> bool {
    let code = c as u32;
    (0x4E00..=0x9FFF).contains(&code) // CJK Unified Ideographs
        || (0x3040..=0x309F).contains(&code) // Hiragana
        || (0x30A0..=0x30FF).contains(&code) // Katakana
        || (0xAC00..=0xD7AF).contains(&code) // Hangul
}
