use serde::{Deserialize, Serialize};

/// Pages read at most by default.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Document information and structure.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    /// PDF header version, e.g. `"1.7"`.
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Pages after this one are ignored.
    pub max_pages: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Text pulled out of a document.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExtractedText {
    /// Cleaned text. Visual lines are separated by `\n`, paragraph gaps and
    /// page breaks by `\n\n`.
    pub text: String,
    pub page_count: usize,
    pub pages_read: usize,
    pub metadata: DocumentMetadata,
}
