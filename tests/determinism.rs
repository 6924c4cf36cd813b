//! Property tests for segmentation invariants.

use std::collections::HashMap;

use proptest::prelude::*;

use mindmeld::segment::parser::parse_blocks;
use mindmeld::segment::{IdScope, Segmenter};

fn word() -> impl Strategy<Value = String> {
    "[a-z]{3,8}"
}

fn paragraph() -> impl Strategy<Value = String> {
    prop::collection::vec(word(), 1..12).prop_map(|words| words.join(" "))
}

fn section() -> impl Strategy<Value = String> {
    (
        word(),
        prop::collection::vec(paragraph(), 1..4),
        prop::option::of(paragraph()),
    )
        .prop_map(|(title, paragraphs, code)| {
            let mut out = format!("# {title}\n\n");
            for p in &paragraphs {
                out.push_str(p);
                out.push_str("\n\n");
            }
            if let Some(code) = code {
                out.push_str(&format!("```\n{code}\n```\n\n"));
            }
            out
        })
}

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(section(), 1..5).prop_map(|sections| sections.concat())
}

proptest! {
    #[test]
    fn segmentation_is_deterministic(doc in document()) {
        let segmenter = Segmenter::new(60, 20, IdScope::Content);
        prop_assert_eq!(segmenter.segment(&doc), segmenter.segment(&doc));
    }

    #[test]
    fn no_parsed_block_is_lost(doc in document()) {
        let segmenter = Segmenter::new(60, 20, IdScope::Content);
        let chunks = segmenter.segment(&doc);
        let chunk_ids: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.blocks.iter().map(|b| b.element_id.clone()))
            .collect();
        for block in parse_blocks(&doc, IdScope::Content) {
            prop_assert!(
                chunk_ids.contains(&block.element_id),
                "lost block {}",
                block.element_id
            );
        }
    }

    #[test]
    fn atomic_blocks_appear_exactly_once(doc in document()) {
        let segmenter = Segmenter::new(60, 20, IdScope::Content);
        let chunks = segmenter.segment(&doc);
        // Identical content in two sections legitimately repeats an id, so
        // compare against the parse rather than demanding global uniqueness.
        let mut parsed: HashMap<String, usize> = HashMap::new();
        for block in parse_blocks(&doc, IdScope::Content) {
            if block.is_atomic() {
                *parsed.entry(block.element_id).or_default() += 1;
            }
        }
        let mut seen: HashMap<String, usize> = HashMap::new();
        for block in chunks.iter().flat_map(|c| &c.blocks) {
            if block.is_atomic() {
                *seen.entry(block.element_id.clone()).or_default() += 1;
            }
        }
        prop_assert_eq!(seen, parsed);
    }

    #[test]
    fn chunk_budget_respected_unless_flagged(doc in document()) {
        let segmenter = Segmenter::new(60, 0, IdScope::Content);
        for chunk in segmenter.segment(&doc) {
            if !chunk.metadata.oversized {
                prop_assert!(chunk.metadata.token_count <= 60);
            }
        }
    }
}
