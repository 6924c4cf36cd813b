//! Markdown structural parsing.
//!
//! Walks the pulldown-cmark event stream and flattens the document into
//! [`Block`]s. Heading nesting is tracked with a level stack so every block
//! records the titles of its enclosing sections.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use super::block::{make_block, Block, BlockKind, IdScope};

/// Parse `text` into flattened blocks in document order.
pub fn parse_blocks(text: &str, scope: IdScope) -> Vec<Block> {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events: Vec<Event> = Parser::new_ext(text, options).collect();

    let mut blocks = Vec::new();
    // (level, title) of each currently open section, outermost first.
    let mut stack: Vec<(u8, String)> = Vec::new();

    let mut i = 0;
    while i < events.len() {
        match &events[i] {
            Event::Start(Tag::Heading { level, .. }) => {
                let lvl = heading_level(*level);
                let (title, next) = collect_inline_text(&events, i + 1, TagEnd::Heading(*level));
                while stack.last().is_some_and(|(l, _)| *l >= lvl) {
                    stack.pop();
                }
                stack.push((lvl, title.clone()));
                if !title.is_empty() {
                    blocks.push(make_block(
                        BlockKind::Heading { level: lvl },
                        title,
                        current_path(&stack),
                        scope,
                    ));
                }
                i = next;
            }
            Event::Start(Tag::Paragraph) => {
                i = collect_paragraph(&events, i + 1, &current_path(&stack), scope, &mut blocks);
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                let language = match kind {
                    CodeBlockKind::Fenced(lang) => lang
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                let (code, next) = collect_code(&events, i + 1);
                let body = code.trim_end_matches('\n').to_string();
                if !body.trim().is_empty() {
                    blocks.push(make_block(
                        BlockKind::Code { language },
                        body,
                        current_path(&stack),
                        scope,
                    ));
                }
                i = next;
            }
            Event::Start(Tag::Table(_)) => {
                let (markdown, next) = collect_table(&events, i + 1);
                if !markdown.is_empty() {
                    blocks.push(make_block(
                        BlockKind::Table,
                        markdown,
                        current_path(&stack),
                        scope,
                    ));
                }
                i = next;
            }
            _ => i += 1,
        }
    }

    blocks
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn current_path(stack: &[(u8, String)]) -> Vec<String> {
    stack.iter().map(|(_, title)| title.clone()).collect()
}

/// Gather plain text until `end`, returning (text, index past the end tag).
fn collect_inline_text(events: &[Event], start: usize, end: TagEnd) -> (String, usize) {
    let mut text = String::new();
    let mut i = start;
    while i < events.len() {
        match &events[i] {
            Event::End(tag) if *tag == end => return (text.trim().to_string(), i + 1),
            Event::Text(t) => text.push_str(t),
            Event::Code(c) => {
                text.push('`');
                text.push_str(c);
                text.push('`');
            }
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
        i += 1;
    }
    (text.trim().to_string(), i)
}

/// Walk a paragraph's inline events. Images nested in the paragraph are
/// emitted as standalone blocks; the remaining prose becomes one paragraph
/// block if anything is left.
fn collect_paragraph(
    events: &[Event],
    start: usize,
    heading_path: &[String],
    scope: IdScope,
    blocks: &mut Vec<Block>,
) -> usize {
    let mut text = String::new();
    let mut i = start;
    while i < events.len() {
        match &events[i] {
            Event::End(TagEnd::Paragraph) => {
                i += 1;
                break;
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                let src = dest_url.to_string();
                let (alt, next) = collect_inline_text(events, i + 1, TagEnd::Image);
                blocks.push(make_block(
                    BlockKind::Image { alt, src },
                    String::new(),
                    heading_path.to_vec(),
                    scope,
                ));
                i = next;
            }
            Event::Text(t) => {
                text.push_str(t);
                i += 1;
            }
            Event::Code(c) => {
                text.push('`');
                text.push_str(c);
                text.push('`');
                i += 1;
            }
            Event::SoftBreak => {
                text.push(' ');
                i += 1;
            }
            Event::HardBreak => {
                text.push('\n');
                i += 1;
            }
            _ => i += 1,
        }
    }

    let body = text.trim().to_string();
    if !body.is_empty() {
        blocks.push(make_block(
            BlockKind::Paragraph,
            body,
            heading_path.to_vec(),
            scope,
        ));
    }
    i
}

fn collect_code(events: &[Event], start: usize) -> (String, usize) {
    let mut code = String::new();
    let mut i = start;
    while i < events.len() {
        match &events[i] {
            Event::End(TagEnd::CodeBlock) => return (code, i + 1),
            Event::Text(t) => code.push_str(t),
            _ => {}
        }
        i += 1;
    }
    (code, i)
}

/// Re-render a table back to pipe-delimited markdown.
fn collect_table(events: &[Event], start: usize) -> (String, usize) {
    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current_row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_head = false;
    let mut in_cell = false;

    let mut i = start;
    while i < events.len() {
        match &events[i] {
            Event::End(TagEnd::Table) => {
                i += 1;
                break;
            }
            Event::Start(Tag::TableHead) => in_head = true,
            Event::End(TagEnd::TableHead) => in_head = false,
            Event::Start(Tag::TableRow) => current_row.clear(),
            Event::End(TagEnd::TableRow) => rows.push(std::mem::take(&mut current_row)),
            Event::Start(Tag::TableCell) => {
                in_cell = true;
                cell.clear();
            }
            Event::End(TagEnd::TableCell) => {
                in_cell = false;
                let value = cell.trim().to_string();
                if in_head {
                    headers.push(value);
                } else {
                    current_row.push(value);
                }
            }
            Event::Text(t) if in_cell => cell.push_str(t),
            Event::Code(c) if in_cell => {
                cell.push('`');
                cell.push_str(c);
                cell.push('`');
            }
            _ => {}
        }
        i += 1;
    }

    if headers.is_empty() && rows.is_empty() {
        return (String::new(), i);
    }

    let mut lines = Vec::new();
    if !headers.is_empty() {
        lines.push(format!("| {} |", headers.join(" | ")));
        lines.push(format!(
            "| {} |",
            headers.iter().map(|_| "---").collect::<Vec<_>>().join(" | ")
        ));
    }
    for row in &rows {
        if !row.is_empty() {
            lines.push(format!("| {} |", row.join(" | ")));
        }
    }
    (lines.join("\n"), i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_paths_nest() {
        let doc = "# Top\n\nintro text here\n\n## Inner\n\ninner text here\n";
        let blocks = parse_blocks(doc, IdScope::Content);
        assert_eq!(blocks.len(), 4);

        assert_eq!(blocks[0].heading_path, vec!["Top"]);
        assert_eq!(blocks[1].heading_path, vec!["Top"]);
        assert_eq!(blocks[2].heading_path, vec!["Top", "Inner"]);
        assert_eq!(blocks[3].heading_path, vec!["Top", "Inner"]);
    }

    #[test]
    fn test_sibling_heading_closes_previous() {
        let doc = "# A\n\n## B\n\n## C\n\ntext under c\n";
        let blocks = parse_blocks(doc, IdScope::Content);
        let last = blocks.last().unwrap();
        assert_eq!(last.heading_path, vec!["A", "C"]);
    }

    #[test]
    fn test_h1_after_h2_resets_stack() {
        let doc = "# A\n\n## B\n\n# D\n\ntext under d\n";
        let blocks = parse_blocks(doc, IdScope::Content);
        let last = blocks.last().unwrap();
        assert_eq!(last.heading_path, vec!["D"]);
    }

    #[test]
    fn test_code_fence_language() {
        let doc = "```rust\nfn main() {}\n```\n";
        let blocks = parse_blocks(doc, IdScope::Content);
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].kind,
            BlockKind::Code {
                language: "rust".into()
            }
        );
        assert_eq!(blocks[0].text, "fn main() {}");
    }

    #[test]
    fn test_table_rendered_as_markdown() {
        let doc = "| a | b |\n| --- | --- |\n| 1 | 2 |\n";
        let blocks = parse_blocks(doc, IdScope::Content);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Table);
        assert_eq!(blocks[0].text, "| a | b |\n| --- | --- |\n| 1 | 2 |");
    }

    #[test]
    fn test_image_extracted_from_paragraph() {
        let doc = "Before ![alt text](img/pic.png) after.\n";
        let blocks = parse_blocks(doc, IdScope::Content);
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0].kind,
            BlockKind::Image {
                alt: "alt text".into(),
                src: "img/pic.png".into()
            }
        );
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
        assert!(blocks[1].text.contains("Before"));
        assert!(blocks[1].text.contains("after."));
    }

    #[test]
    fn test_empty_document_yields_no_blocks() {
        assert!(parse_blocks("", IdScope::Content).is_empty());
        assert!(parse_blocks("\n\n  \n", IdScope::Content).is_empty());
    }

    #[test]
    fn test_inline_code_preserved_in_paragraph() {
        let doc = "Call `foo()` before use.\n";
        let blocks = parse_blocks(doc, IdScope::Content);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Call `foo()` before use.");
    }
}
