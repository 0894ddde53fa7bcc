//! File naming and validation rules for uploads and converted documents.

use std::path::Path;

use rand::Rng;
use thiserror::Error;

/// Longest allowed file name, in characters.
pub const MAX_FILENAME_CHARS: usize = 255;

/// Sanitized base names are cut to this many characters.
const MAX_BASENAME_CHARS: usize = 50;

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Reasons an uploaded file is refused before any processing happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("Only PDF files are allowed")]
    InvalidType,
    #[error("Empty files are not allowed")]
    Empty,
    #[error("File size exceeds maximum allowed size of {}", human_size(.max))]
    TooLarge { max: u64 },
    #[error("Filename is too long")]
    NameTooLong,
    #[error("Invalid filename")]
    SuspiciousName,
}

fn human_size(bytes: &u64) -> String {
    format_file_size(*bytes)
}

/// Random lowercase base-36 suffix used to keep generated names unique.
pub fn random_suffix<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// Strip characters that are unsafe in file names on common platforms.
///
/// Returns `"file"` when nothing usable is left.
pub fn sanitize_basename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| {
            !c.is_control()
                && !matches!(c, '/' | '\\' | '?' | '<' | '>' | ':' | '*' | '|' | '"')
        })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.');

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return "file".to_string();
    }

    cleaned.chars().take(MAX_BASENAME_CHARS).collect()
}

/// Build `<base>-<timestamp>-<suffix><.ext>` from an original file name.
///
/// The extension of `original` is kept as-is (including its dot); the base
/// name is sanitized and shortened.
pub fn unique_filename(original: &str, timestamp_millis: i64, suffix: &str) -> String {
    let path = Path::new(original);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let base = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    format!(
        "{}-{}-{}{}",
        sanitize_basename(base),
        timestamp_millis,
        suffix,
        extension
    )
}

/// Document title derived from an uploaded file name (its stem).
pub fn title_from_filename(original: &str) -> Option<String> {
    Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Lower-cased extension of `name`, including the leading dot.
pub fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

const EXECUTABLE_EXTENSIONS: [&str; 8] = [
    ".exe", ".bat", ".cmd", ".com", ".pif", ".scr", ".vbs", ".js",
];

fn is_suspicious_name(name: &str) -> bool {
    name.contains("..")
        || name.starts_with('.')
        || name
            .chars()
            .any(|c| matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*'))
        || EXECUTABLE_EXTENSIONS.contains(&file_extension(name).as_str())
}

/// Check an uploaded file's declared name, MIME type and size.
pub fn validate_upload(
    name: &str,
    mime: Option<&str>,
    size: u64,
    max_size: u64,
) -> Result<(), UploadRejection> {
    if file_extension(name) != ".pdf" || mime != Some(PDF_MIME_TYPE) {
        return Err(UploadRejection::InvalidType);
    }
    if size == 0 {
        return Err(UploadRejection::Empty);
    }
    if size > max_size {
        return Err(UploadRejection::TooLarge { max: max_size });
    }
    if name.chars().count() > MAX_FILENAME_CHARS {
        return Err(UploadRejection::NameTooLong);
    }
    if is_suspicious_name(name) {
        return Err(UploadRejection::SuspiciousName);
    }
    Ok(())
}

/// Whether `name` is acceptable as a download request path segment.
///
/// Only `[A-Za-z0-9._-]` is allowed, and never `..`.
pub fn is_valid_download_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=MAX_FILENAME_CHARS).contains(&len)
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Human-readable size, e.g. `"0 Bytes"`, `"1.5 KB"`, `"10 MB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let bytes = bytes as f64;
    let exponent = ((bytes.ln() / 1024f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = bytes / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;

    format!("{} {}", rounded, UNITS[exponent])
}
