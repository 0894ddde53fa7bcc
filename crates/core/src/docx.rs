//! Encoding of a [`Document`] as an Office Open XML (`.docx`) package.

use std::io::Cursor;

use docx_rs::{Docx, LineSpacing, Paragraph, Run, RunFonts, Style, StyleType};
use thiserror::Error;

use crate::document::{Document, Element, Spacing};

pub const EXTENSION: &str = "docx";

pub const MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const HEADING_STYLE_ID: &str = "Heading1";

/// Heading size in half-points (16pt).
const HEADING_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("Failed to encode Word document: {0}")]
    Encode(String),
}

fn line_spacing(spacing: &Spacing) -> LineSpacing {
    let mut ls = LineSpacing::new();
    if let Some(before) = spacing.before {
        ls = ls.before(before);
    }
    if let Some(after) = spacing.after {
        ls = ls.after(after);
    }
    if let Some(line) = spacing.line {
        ls = ls.line(line);
    }
    ls
}

fn fonts(family: &str) -> RunFonts {
    RunFonts::new()
        .ascii(family)
        .hi_ansi(family)
        .east_asia(family)
        .cs(family)
}

fn to_paragraph(element: &Element) -> Paragraph {
    match element {
        Element::Heading { text, spacing, .. } => Paragraph::new()
            .add_run(Run::new().add_text(text))
            .style(HEADING_STYLE_ID)
            .line_spacing(line_spacing(spacing)),
        Element::Paragraph { text, run, spacing } => Paragraph::new()
            .add_run(
                Run::new()
                    .add_text(text)
                    .size(run.size)
                    .fonts(fonts(&run.font)),
            )
            .line_spacing(line_spacing(spacing)),
    }
}

fn to_docx(doc: &Document) -> Docx {
    let heading_style = Style::new(HEADING_STYLE_ID, StyleType::Paragraph)
        .name("Heading 1")
        .size(HEADING_SIZE)
        .bold();

    let docx = doc
        .elements
        .iter()
        .fold(Docx::new().add_style(heading_style), |docx, element| {
            docx.add_paragraph(to_paragraph(element))
        });

    docx.custom_property("creator", doc.metadata.creator.as_str())
        .custom_property("title", doc.metadata.title.as_str())
        .custom_property("description", doc.metadata.description.as_str())
}

/// Encode `doc` into the bytes of a `.docx` file.
///
/// The whole package is built in memory; nothing is written until the caller
/// persists the returned buffer.
pub fn to_bytes(doc: &Document) -> Result<Vec<u8>, DocxError> {
    let mut buf = Cursor::new(Vec::new());
    to_docx(doc)
        .build()
        .pack(&mut buf)
        .map_err(|e| DocxError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}
