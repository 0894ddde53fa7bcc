//! Mapping of segmented blocks onto a Word document model.
//!
//! The model here is deliberately independent of the encoder: it records
//! exactly what will be written (text, run properties, paragraph spacing,
//! document properties) so it can be compared and inspected in tests. The
//! [`crate::docx`] module turns it into bytes.

use serde::{Deserialize, Serialize};

use crate::options::FormattingOptions;
use crate::segment::{segment, Block};

/// Twentieths of a point per line at single spacing.
pub const TWIPS_PER_LINE: f64 = 240.0;

/// Space before a heading (12pt).
pub const HEADING_SPACING_BEFORE: u32 = 240;

/// Space after a heading (6pt).
pub const HEADING_SPACING_AFTER: u32 = 120;

/// Space after a body paragraph (6pt).
pub const PARAGRAPH_SPACING_AFTER: u32 = 120;

pub const CREATOR: &str = "ConverteAI";

pub const DESCRIPTION: &str = "Document converted from PDF using ConverteAI";

/// Paragraph spacing in twips. `line` is only set for body text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spacing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i32>,
}

/// Character formatting of a body text run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProperties {
    /// Size in half-points.
    pub size: usize,
    pub font: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Element {
    Heading {
        text: String,
        level: u8,
        spacing: Spacing,
    },
    Paragraph {
        text: String,
        run: RunProperties,
        spacing: Spacing,
    },
}

impl Element {
    pub fn text(&self) -> &str {
        match self {
            Element::Heading { text, .. } | Element::Paragraph { text, .. } => text,
        }
    }
}

/// Document-level properties, written once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub creator: String,
    pub title: String,
    pub description: String,
}

/// A fully assembled document, ready to be encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub metadata: Metadata,
    pub options: FormattingOptions,
    pub elements: Vec<Element>,
}

/// Line spacing in twips for a multiplier, rounded half away from zero.
pub fn line_spacing_twips(multiplier: f64) -> i32 {
    (multiplier * TWIPS_PER_LINE).round() as i32
}

fn heading_element(text: &str) -> Element {
    Element::Heading {
        text: text.to_string(),
        level: 1,
        spacing: Spacing {
            before: Some(HEADING_SPACING_BEFORE),
            after: Some(HEADING_SPACING_AFTER),
            line: None,
        },
    }
}

fn paragraph_element(text: &str, options: &FormattingOptions) -> Element {
    Element::Paragraph {
        text: text.to_string(),
        run: RunProperties {
            size: options.font_size_half_points,
            font: options.font_family.clone(),
        },
        spacing: Spacing {
            before: None,
            after: Some(PARAGRAPH_SPACING_AFTER),
            line: Some(line_spacing_twips(options.line_spacing_multiplier)),
        },
    }
}

/// Map a block sequence onto a [`Document`].
pub fn assemble(blocks: &[Block], options: &FormattingOptions) -> Document {
    let elements = blocks
        .iter()
        .map(|block| match block {
            Block::Heading(text) => heading_element(text),
            Block::Paragraph(text) => paragraph_element(text, options),
        })
        .collect();

    Document {
        metadata: Metadata {
            creator: CREATOR.to_string(),
            title: options.title_or_default().to_string(),
            description: DESCRIPTION.to_string(),
        },
        options: options.clone(),
        elements,
    }
}

/// Segment `text` and assemble the result.
///
/// The text is trimmed first, so surrounding blank lines never reach the
/// segmenter.
pub fn build_document(text: &str, options: &FormattingOptions) -> Document {
    let blocks = segment(text.trim(), options);
    assemble(&blocks, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blocks() -> Vec<Block> {
        vec![
            Block::Heading("TITLE".to_string()),
            Block::Paragraph("This is a sentence.".to_string()),
        ]
    }

    #[test]
    fn test_line_spacing_twips() {
        assert_eq!(line_spacing_twips(1.0), 240);
        assert_eq!(line_spacing_twips(1.2), 288);
        assert_eq!(line_spacing_twips(1.5), 360);
        assert_eq!(line_spacing_twips(1.15), 276);
    }

    #[test]
    fn test_assemble_heading_uses_fixed_spacing() {
        let options = FormattingOptions {
            line_spacing_multiplier: 2.0,
            ..FormattingOptions::default()
        };
        let doc = assemble(&sample_blocks(), &options);

        assert_eq!(
            doc.elements[0],
            Element::Heading {
                text: "TITLE".to_string(),
                level: 1,
                spacing: Spacing {
                    before: Some(240),
                    after: Some(120),
                    line: None,
                },
            }
        );
    }

    #[test]
    fn test_assemble_paragraph_uses_options() {
        let options = FormattingOptions {
            font_size_half_points: 22,
            font_family: "Arial".to_string(),
            line_spacing_multiplier: 1.5,
            ..FormattingOptions::default()
        };
        let doc = assemble(&sample_blocks(), &options);

        assert_eq!(
            doc.elements[1],
            Element::Paragraph {
                text: "This is a sentence.".to_string(),
                run: RunProperties {
                    size: 22,
                    font: "Arial".to_string(),
                },
                spacing: Spacing {
                    before: None,
                    after: Some(120),
                    line: Some(360),
                },
            }
        );
    }

    #[test]
    fn test_assemble_metadata() {
        let doc = assemble(&sample_blocks(), &FormattingOptions::default());
        assert_eq!(doc.metadata.creator, "ConverteAI");
        assert_eq!(doc.metadata.title, "PDF Conversion");
        assert_eq!(
            doc.metadata.description,
            "Document converted from PDF using ConverteAI"
        );

        let doc = assemble(
            &sample_blocks(),
            &FormattingOptions::default().with_title("Quarterly Report"),
        );
        assert_eq!(doc.metadata.title, "Quarterly Report");
    }

    #[test]
    fn test_assemble_preserves_block_order() {
        let blocks = vec![
            Block::Paragraph("one.".to_string()),
            Block::Heading("TWO".to_string()),
            Block::Paragraph("three.".to_string()),
        ];
        let doc = assemble(&blocks, &FormattingOptions::default());
        let texts: Vec<&str> = doc.elements.iter().map(Element::text).collect();
        assert_eq!(texts, vec!["one.", "TWO", "three."]);
    }

    #[test]
    fn test_assemble_is_idempotent() {
        let options = FormattingOptions::default().with_title("Same");
        let first = assemble(&sample_blocks(), &options);
        let second = assemble(&sample_blocks(), &options);
        assert_eq!(first, second);
    }

    #[test]
    fn test_build_document_trims_before_segmenting() {
        let doc = build_document("\n\n  INTRO\n\nBody text.\n\n", &FormattingOptions::default());
        let texts: Vec<&str> = doc.elements.iter().map(Element::text).collect();
        assert_eq!(texts, vec!["INTRO", "Body text."]);
        assert!(matches!(doc.elements[0], Element::Heading { .. }));
    }
}
