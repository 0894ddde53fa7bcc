//! Formatting options for the generated Word document.

use serde::{Deserialize, Serialize};

/// Title used when the caller does not supply one.
pub const DEFAULT_TITLE: &str = "PDF Conversion";

/// Formatting parameters applied while segmenting and assembling a document.
///
/// Font sizes are expressed in half-points, the unit used by WordprocessingML,
/// so the default of `24` renders as 12pt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormattingOptions {
    /// Body text size in half-points.
    pub font_size_half_points: usize,
    /// Body text font family.
    pub font_family: String,
    /// Line spacing multiplier; `1.0` is single spacing.
    pub line_spacing_multiplier: f64,
    /// Promote heading-looking lines to level-1 headings.
    pub detect_headings: bool,
    /// End a paragraph on lines finishing with `.`, `!`, `?` or `:`.
    pub preserve_line_breaks: bool,
    /// Document title stored in the document properties.
    pub title: Option<String>,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            font_size_half_points: 24,
            font_family: "Calibri".to_string(),
            line_spacing_multiplier: 1.2,
            detect_headings: true,
            preserve_line_breaks: true,
            title: None,
        }
    }
}

impl FormattingOptions {
    /// Set the document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// The title to store in the document, falling back to [`DEFAULT_TITLE`]
    /// when none was given or the given one is blank.
    pub fn title_or_default(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
    }
}
