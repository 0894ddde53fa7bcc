//! Heuristic segmentation of extracted text into headings and paragraphs.
//!
//! Text coming out of a PDF has lost all of its structure: what is left is a
//! sequence of lines. This module guesses the structure back with a handful
//! of line-level rules:
//!
//! - blank lines separate paragraphs;
//! - lines that look like headings (see [`is_heading`]) become headings;
//! - everything else is joined into the current paragraph, which is closed
//!   early when a line ends with terminal punctuation.
//!
//! Segmentation is total: any input, including the empty string, produces a
//! block sequence and never an error.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::options::FormattingOptions;

/// Lines longer than this are never headings.
pub const MAX_HEADING_CHARS: usize = 100;

/// Upper bound (exclusive) for the "short line followed by a blank" rule.
pub const SHORT_LINE_CHARS: usize = 80;

/// A unit of structured output, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "lowercase")]
pub enum Block {
    Heading(String),
    Paragraph(String),
}

impl Block {
    pub fn text(&self) -> &str {
        match self {
            Block::Heading(text) | Block::Paragraph(text) => text,
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self, Block::Heading(_))
    }
}

fn heading_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // ALL CAPS
            r"^[A-Z][A-Z\s]{2,}$",
            // Numbered headings ("1. Introduction")
            r"^[0-9]+\.\s+[A-Z]",
            // Title Case
            r"^[A-Z][a-z]+(\s+[A-Z][a-z]+)*$",
            r"(?i)^Chapter\s+[0-9]+",
            r"(?i)^Section\s+[0-9]+",
            // CATEGORY:
            r"^[A-Z]+\s*:$",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// Decide whether a trimmed line looks like a heading.
///
/// `next_line` is the raw line that follows, if any. A line qualifies when it
/// matches one of the textual heading patterns, or when it is short, does not
/// end in `.` or `,`, and is followed by a blank line or the end of the text.
pub fn is_heading(line: &str, next_line: Option<&str>) -> bool {
    let len = line.chars().count();
    if len > MAX_HEADING_CHARS {
        return false;
    }

    if heading_patterns().iter().any(|re| re.is_match(line)) {
        return true;
    }

    let is_short = len < SHORT_LINE_CHARS;
    let no_end_punctuation = !line.ends_with('.') && !line.ends_with(',');
    let next_line_empty = next_line.is_none_or(|next| next.trim().is_empty());

    is_short && no_end_punctuation && next_line_empty
}

fn ends_paragraph(line: &str) -> bool {
    line.ends_with(['.', '!', '?', ':'])
}

/// Pending paragraph fragments.
#[derive(Debug, Default)]
struct Accumulator {
    fragments: Vec<String>,
}

impl Accumulator {
    fn push(&mut self, fragment: &str) {
        self.fragments.push(fragment.to_string());
    }

    fn flush_into(&mut self, blocks: &mut Vec<Block>) {
        if !self.fragments.is_empty() {
            blocks.push(Block::Paragraph(self.fragments.join(" ")));
            self.fragments.clear();
        }
    }
}

/// Split raw text into an ordered sequence of [`Block`]s.
pub fn segment(text: &str, options: &FormattingOptions) -> Vec<Block> {
    let raw_lines: Vec<&str> = text.split('\n').collect();
    let mut blocks = Vec::new();
    let mut pending = Accumulator::default();

    for (i, raw) in raw_lines.iter().enumerate() {
        let line = raw.trim();

        if line.is_empty() {
            pending.flush_into(&mut blocks);
            continue;
        }

        let next_line = raw_lines.get(i + 1).copied();
        if options.detect_headings && is_heading(line, next_line) {
            pending.flush_into(&mut blocks);
            blocks.push(Block::Heading(line.to_string()));
            continue;
        }

        pending.push(line);

        if options.preserve_line_breaks && ends_paragraph(line) {
            pending.flush_into(&mut blocks);
        }
    }

    pending.flush_into(&mut blocks);

    // Only blank input gets here with nothing to show.
    if blocks.is_empty() {
        blocks.push(Block::Paragraph(text.to_string()));
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> FormattingOptions {
        FormattingOptions::default()
    }

    fn heading(text: &str) -> Block {
        Block::Heading(text.to_string())
    }

    fn paragraph(text: &str) -> Block {
        Block::Paragraph(text.to_string())
    }

    // ============================================================================
    // is_heading tests
    // ============================================================================

    #[test]
    fn test_is_heading_all_caps() {
        assert!(is_heading("INTRODUCTION", Some("Body text follows here")));
        assert!(is_heading("TERMS AND CONDITIONS", Some("x")));
    }

    #[test]
    fn test_is_heading_all_caps_too_short() {
        // Two capitals are not enough for the ALL CAPS rule, and the line has
        // a follower, so the short-line rule does not apply either.
        assert!(!is_heading("AB", Some("next line")));
        assert!(is_heading("ABC", Some("next line")));
    }

    #[test]
    fn test_is_heading_numbered() {
        assert!(is_heading("1. Introduction to the topic", Some("more")));
        assert!(is_heading("12.  Results", Some("more")));
        assert!(!is_heading("1.5 million people live there.", Some("more")));
    }

    #[test]
    fn test_is_heading_title_case() {
        assert!(is_heading("Background Information", Some("more")));
        assert!(is_heading("Summary", Some("more")));
        assert!(!is_heading("Background information and more", Some("more")));
    }

    #[test]
    fn test_is_heading_chapter_and_section_case_insensitive() {
        assert!(is_heading("Chapter 3", Some("more")));
        assert!(is_heading("chapter 12: The End of the road.", Some("more")));
        assert!(is_heading("SECTION 4", Some("more")));
        assert!(is_heading("section 2.1 overview.", Some("more")));
    }

    #[test]
    fn test_is_heading_numbers_are_ascii_only() {
        let next = Some("Body text follows here");
        assert!(is_heading("1. Intro", next));
        assert!(!is_heading("\u{661}. Intro", next));
        assert!(!is_heading("Chapter \u{663}", next));
        assert!(!is_heading("Section \u{663}", next));
    }

    #[test]
    fn test_is_heading_category_colon() {
        assert!(is_heading("NOTE:", Some("more")));
        assert!(is_heading("WARNING :", Some("more")));
    }

    #[test]
    fn test_is_heading_short_line_before_blank() {
        assert!(is_heading("a short line without a period", Some("")));
        assert!(is_heading("a short line without a period", Some("   ")));
        assert!(is_heading("a short line without a period", None));
    }

    #[test]
    fn test_is_heading_short_line_rule_needs_blank_follower() {
        assert!(!is_heading("a short line without a period", Some("continues")));
    }

    #[test]
    fn test_is_heading_short_line_rule_rejects_period_and_comma() {
        assert!(!is_heading("ends with a period.", None));
        assert!(!is_heading("ends with a comma,", None));
        // Other punctuation does not disqualify.
        assert!(is_heading("is this a question?", None));
    }

    #[test]
    fn test_is_heading_length_guard() {
        let long = "A".repeat(MAX_HEADING_CHARS + 1);
        assert!(!is_heading(&long, None));

        let at_limit = "A".repeat(MAX_HEADING_CHARS);
        assert!(is_heading(&at_limit, Some("more")));
    }

    #[test]
    fn test_is_heading_short_line_rule_bound() {
        let line = "x".repeat(SHORT_LINE_CHARS);
        assert!(!is_heading(&line, None));

        let line = "x".repeat(SHORT_LINE_CHARS - 1);
        assert!(is_heading(&line, None));
    }

    #[test]
    fn test_is_heading_counts_characters_not_bytes() {
        // 79 two-byte characters: short by character count.
        let line = "é".repeat(SHORT_LINE_CHARS - 1);
        assert!(is_heading(&line, None));
    }

    // ============================================================================
    // segment tests
    // ============================================================================

    #[test]
    fn test_segment_heading_then_sentences() {
        let blocks = segment("TITLE\n\nThis is a sentence.\nAnother one.\n", &defaults());
        assert_eq!(
            blocks,
            vec![
                heading("TITLE"),
                paragraph("This is a sentence."),
                paragraph("Another one."),
            ]
        );
    }

    #[test]
    fn test_segment_sentences_on_one_line_stay_together() {
        let blocks = segment("TITLE\n\nThis is a sentence. Another one.\n", &defaults());
        assert_eq!(
            blocks,
            vec![heading("TITLE"), paragraph("This is a sentence. Another one.")]
        );
    }

    #[test]
    fn test_segment_chapter_heading_with_body() {
        let blocks = segment(
            "Chapter 1\nSome body text without terminal punctuation\ncontinued on the next line.\n\nMore text.",
            &defaults(),
        );
        assert_eq!(
            blocks,
            vec![
                heading("Chapter 1"),
                paragraph(
                    "Some body text without terminal punctuation continued on the next line."
                ),
                paragraph("More text."),
            ]
        );
    }

    #[test]
    fn test_segment_short_line_before_blank_is_heading() {
        let blocks = segment(
            "Chapter 1\nSome body text without terminal punctuation\n\nMore text.",
            &defaults(),
        );
        assert_eq!(
            blocks,
            vec![
                heading("Chapter 1"),
                heading("Some body text without terminal punctuation"),
                paragraph("More text."),
            ]
        );
    }

    #[test]
    fn test_segment_short_line_before_blank_without_heading_detection() {
        let options = FormattingOptions {
            detect_headings: false,
            ..defaults()
        };
        let blocks = segment(
            "Chapter 1\nSome body text without terminal punctuation\n\nMore text.",
            &options,
        );
        assert_eq!(
            blocks,
            vec![
                paragraph("Chapter 1 Some body text without terminal punctuation"),
                paragraph("More text."),
            ]
        );
    }

    #[test]
    fn test_segment_long_line_is_paragraph() {
        let line = format!("{}.", "word ".repeat(30).trim_end());
        assert!(line.chars().count() > MAX_HEADING_CHARS);

        let no_period = "W".repeat(150);
        for input in [line.as_str(), no_period.as_str()] {
            let blocks = segment(input, &defaults());
            assert_eq!(blocks, vec![paragraph(input)]);
        }
    }

    #[test]
    fn test_segment_joins_lines_with_single_space() {
        let blocks = segment(
            "the quick brown fox\n   jumps over   \nthe lazy dog.",
            &defaults(),
        );
        assert_eq!(
            blocks,
            vec![paragraph("the quick brown fox jumps over the lazy dog.")]
        );
    }

    #[test]
    fn test_segment_terminal_punctuation_flushes() {
        let blocks = segment(
            "first line ends here!\nsecond one asks?\nthird introduces:\nfourth line",
            &defaults(),
        );
        assert_eq!(
            blocks,
            vec![
                paragraph("first line ends here!"),
                paragraph("second one asks?"),
                paragraph("third introduces:"),
                heading("fourth line"),
            ]
        );
    }

    #[test]
    fn test_segment_without_preserve_line_breaks() {
        let options = FormattingOptions {
            preserve_line_breaks: false,
            ..defaults()
        };
        let blocks = segment("one sentence.\ntwo sentences.\n\nnext.", &options);
        assert_eq!(
            blocks,
            vec![paragraph("one sentence. two sentences."), paragraph("next.")]
        );
    }

    #[test]
    fn test_segment_consecutive_blank_lines_are_separators() {
        let blocks = segment("alpha line,\n\n\n\nbeta line.", &defaults());
        assert_eq!(
            blocks,
            vec![paragraph("alpha line,"), paragraph("beta line.")]
        );
    }

    #[test]
    fn test_segment_heading_flushes_pending_paragraph() {
        let blocks = segment("some words,\nmore words,\nINTRODUCTION\ntext.", &defaults());
        assert_eq!(
            blocks,
            vec![
                paragraph("some words, more words,"),
                heading("INTRODUCTION"),
                paragraph("text."),
            ]
        );
    }

    #[test]
    fn test_segment_handles_crlf() {
        let blocks = segment("HEADER\r\n\r\nbody text.\r\n", &defaults());
        assert_eq!(blocks, vec![heading("HEADER"), paragraph("body text.")]);
    }

    #[test]
    fn test_segment_empty_input_falls_back_to_single_paragraph() {
        assert_eq!(segment("", &defaults()), vec![paragraph("")]);
    }

    #[test]
    fn test_segment_blank_input_falls_back_to_original_text() {
        let text = "  \n\t\n ";
        assert_eq!(segment(text, &defaults()), vec![paragraph(text)]);
    }

    // ============================================================================
    // Properties
    // ============================================================================

    const SAMPLES: &[&str] = &[
        "TITLE\n\nThis is a sentence.\nAnother one.\n",
        "Chapter 1\nSome body text\n\nMore text.",
        "1. Scope\nthis covers, among others,\nthe following items:\n- one\n- two\n\nEND",
        "no structure at all just one long stream of words that keeps going and going without a single break in sight at all ever",
        "a\nb\nc\n\n\nD E F\ng.",
        "  leading spaces\ttabs\t\n\n\n   \ntrailing   ",
    ];

    fn non_empty_lines(text: &str) -> Vec<String> {
        text.split('\n')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_property_order_preserved() {
        for options in [
            defaults(),
            FormattingOptions {
                detect_headings: false,
                preserve_line_breaks: false,
                ..defaults()
            },
        ] {
            for sample in SAMPLES {
                let joined = segment(sample, &options)
                    .iter()
                    .map(|b| b.text().to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                assert_eq!(joined, non_empty_lines(sample).join(" "), "{sample:?}");
            }
        }
    }

    #[test]
    fn test_property_non_empty_output() {
        for sample in SAMPLES {
            assert!(!segment(sample, &defaults()).is_empty());
        }
    }

    #[test]
    fn test_property_headings_are_single_source_lines() {
        for sample in SAMPLES {
            let lines = non_empty_lines(sample);
            for block in segment(sample, &defaults()) {
                if block.is_heading() {
                    assert!(lines.iter().any(|l| l == block.text()), "{block:?}");
                }
            }
        }
    }

    #[test]
    fn test_block_serializes_with_type_tag() {
        let json = serde_json::to_value(heading("Intro")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "heading", "text": "Intro"}));
    }
}
