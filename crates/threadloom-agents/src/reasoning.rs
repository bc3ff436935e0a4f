//! Turning model response blocks into one displayable string.

use crate::providers::ResponseBlock;

/// Concatenate every text block with no separator. Reasoning blocks are ignored.
pub fn join_text(blocks: &[ResponseBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text.as_str()),
            ResponseBlock::Reasoning { .. } => None,
        })
        .collect()
}

/// Render reasoning traces as quoted paragraphs followed by the final answer.
///
/// Only the last text block counts as the answer. Each reasoning block is
/// split on blank lines; whitespace-only paragraphs are dropped, every line
/// of a kept paragraph gets a `"> "` prefix and the paragraph is followed by
/// a blank line.
pub fn format_reasoning(blocks: &[ResponseBlock]) -> String {
    let mut quoted = String::new();
    let mut answer = "";

    for block in blocks {
        match block {
            ResponseBlock::Text { text } => answer = text,
            ResponseBlock::Reasoning { text } => {
                for paragraph in text.split("\n\n") {
                    if paragraph.trim().is_empty() {
                        continue;
                    }
                    let lines: Vec<String> =
                        paragraph.split('\n').map(|line| format!("> {line}")).collect();
                    quoted.push_str(&lines.join("\n"));
                    quoted.push_str("\n\n");
                }
            }
        }
    }

    quoted.push_str(answer);
    quoted
}
