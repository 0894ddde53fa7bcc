use thiserror::Error;

use parser::backend::{LopdfBackend, PdfBackend};

pub mod cleanup;
pub mod parser;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use types::*;

/// Leading bytes of every PDF file.
pub const MAGIC: &[u8] = b"%PDF";

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("The PDF file appears to be corrupted or invalid: {0}")]
    Parse(String),
    #[error("Password-protected PDFs are not supported")]
    Encrypted,
    #[error(
        "This PDF contains no readable text. It may be a scanned document or image-based PDF"
    )]
    NoText,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Whether `bytes` start with the PDF magic number.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

/// Extract the plain text of a PDF held in memory.
///
/// Pages are read in order up to `options.max_pages`; each page contributes
/// its visual lines and pages are separated by a blank line. The result is
/// passed through [`cleanup::cleanup_text`]. A document whose cleaned text is
/// empty fails with [`PdfError::NoText`].
pub fn extract_text(bytes: &[u8], options: ExtractOptions) -> Result<ExtractedText, PdfError> {
    let backend = LopdfBackend::load_bytes(bytes)?;
    let metadata = backend.metadata();
    let (text, pages_read) = collect_pages(&backend, options.max_pages)?;

    let text = cleanup::cleanup_text(&text);
    if text.is_empty() {
        return Err(PdfError::NoText);
    }

    Ok(ExtractedText {
        text,
        page_count: metadata.page_count,
        pages_read,
        metadata,
    })
}

/// Get document metadata without extracting any text.
pub fn info(bytes: &[u8]) -> Result<DocumentMetadata, PdfError> {
    Ok(LopdfBackend::load_bytes(bytes)?.metadata())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Join the text of the first `max_pages` pages. Returns the text and the
/// number of pages read.
fn collect_pages(backend: &dyn PdfBackend, max_pages: usize) -> Result<(String, usize), PdfError> {
    let mut pages_read = 0;
    let mut texts = Vec::new();

    for &page_id in backend.pages().values().take(max_pages) {
        let text = parser::text::extract_page_text(backend, page_id)?;
        pages_read += 1;
        if !text.trim().is_empty() {
            texts.push(text);
        }
    }

    Ok((texts.join("\n\n"), pages_read))
}
