use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use colored::Colorize;
use converteai_core::docx::{self, DocxError};
use converteai_core::{build_document, files, FormattingOptions};
use pdf::{ExtractOptions, PdfError};
use serde::Serialize;

use crate::prelude::{eprintln, println, *};
use crate::store;

/// Base name of every generated document before it is made unique.
pub const OUTPUT_NAME: &str = "converted.docx";

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("No readable text content to convert")]
    EmptyInput,
    #[error(transparent)]
    Extract(#[from] PdfError),
    #[error(transparent)]
    Serialization(#[from] DocxError),
    #[error("Failed to write the Word document: {0}")]
    Io(#[from] io::Error),
    #[error("Conversion task failed: {0}")]
    Task(String),
}

/// Build a Word document from `text` and write it into `out_dir` under a
/// fresh unique name.
///
/// Fails with [`ConversionError::EmptyInput`] before touching the disk when
/// `text` has no visible characters. The file only appears once it is
/// complete. The returned path is absolute even when `out_dir` is not.
pub fn create_document(
    text: &str,
    options: &FormattingOptions,
    out_dir: &Path,
) -> Result<PathBuf, ConversionError> {
    if text.trim().is_empty() {
        return Err(ConversionError::EmptyInput);
    }

    let document = build_document(text, options);
    let bytes = docx::to_bytes(&document)?;

    let name = files::unique_filename(
        OUTPUT_NAME,
        chrono::Utc::now().timestamp_millis(),
        &files::random_suffix(&mut rand::thread_rng()),
    );
    let path = std::path::absolute(out_dir)?.join(name);
    store::write_atomic(&path, &bytes)?;

    log::info!("Word document created successfully: {}", path.display());
    Ok(path)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReport {
    pub output: PathBuf,
    /// Public name of the output, the last component of `output`.
    pub filename: String,
    /// Extracted text length in characters.
    pub text_length: usize,
    pub page_count: usize,
    pub pages_read: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Extract the text of a PDF and turn it into a Word document in `out_dir`.
///
/// Unless `options` carries a title, the document is titled after the stem of
/// `original_name`.
pub fn convert_pdf(
    bytes: &[u8],
    original_name: &str,
    mut options: FormattingOptions,
    out_dir: &Path,
) -> Result<ConversionReport, ConversionError> {
    let started = Instant::now();

    let extracted = pdf::extract_text(bytes, ExtractOptions::default())?;
    log::info!(
        "Extracted {} characters from {} ({} of {} pages)",
        extracted.text.chars().count(),
        original_name,
        extracted.pages_read,
        extracted.page_count
    );

    if options.title.is_none() {
        options.title = files::title_from_filename(original_name);
    }
    let output = create_document(&extracted.text, &options, out_dir)?;
    let filename = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(ConversionReport {
        filename,
        output,
        text_length: extracted.text.chars().count(),
        page_count: extracted.page_count,
        pages_read: extracted.pages_read,
        elapsed: started.elapsed(),
    })
}

/// Run a conversion on the blocking pool.
pub async fn run_blocking(
    bytes: Vec<u8>,
    original_name: String,
    options: FormattingOptions,
    out_dir: PathBuf,
) -> Result<ConversionReport, ConversionError> {
    tokio::task::spawn_blocking(move || convert_pdf(&bytes, &original_name, options, &out_dir))
        .await
        .map_err(|e| ConversionError::Task(e.to_string()))?
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, clap::Args, Clone)]
pub struct FormatArgs {
    /// Body font size in points
    #[arg(long, default_value = "12")]
    font_size: f64,

    /// Body font family
    #[arg(long, default_value = "Calibri")]
    font_family: String,

    /// Line spacing multiplier
    #[arg(long, default_value = "1.2")]
    line_spacing: f64,

    /// Do not promote heading-looking lines
    #[arg(long)]
    no_headings: bool,

    /// Join all lines of a block into one paragraph
    #[arg(long)]
    no_line_breaks: bool,

    /// Document title (defaults to the input file name)
    #[arg(long)]
    title: Option<String>,
}

impl From<FormatArgs> for FormattingOptions {
    fn from(args: FormatArgs) -> Self {
        Self {
            font_size_half_points: (args.font_size * 2.0).round().max(1.0) as usize,
            font_family: args.font_family,
            line_spacing_multiplier: args.line_spacing,
            detect_headings: !args.no_headings,
            preserve_line_breaks: !args.no_line_breaks,
            title: args.title,
        }
    }
}

#[derive(Debug, clap::Parser)]
#[command(name = "convert")]
#[command(about = "Convert a PDF file into a Word document")]
pub struct App {
    /// PDF file to convert
    input: PathBuf,

    /// Directory the .docx is written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Output the conversion report as JSON
    #[arg(long)]
    json: bool,

    #[clap(flatten)]
    format: FormatArgs,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let bytes = tokio::fs::read(&app.input)
        .await
        .wrap_err_with(|| f!("Failed to read {}", app.input.display()))?;
    let name = app
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_eyre("Input path has no file name")?;

    if global.verbose {
        eprintln!("Converting {}...", app.input.display());
    }

    let report = run_blocking(bytes, name, app.format.into(), app.output_dir.clone())
        .await
        .map_err(|e| eyre!("Conversion failed: {e}"))?;

    if app.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if global.verbose {
        eprintln!(
            "{}: {}",
            "Text".green(),
            f!("{} characters", report.text_length).bright_white()
        );
        eprintln!(
            "{}: {}",
            "Pages".green(),
            f!("{} of {}", report.pages_read, report.page_count).bright_white()
        );
        eprintln!(
            "{}: {}",
            "Processing Time".green(),
            f!("{}ms", report.elapsed.as_millis()).bright_white()
        );
    }
    println!("{}", report.output.display());

    Ok(())
}
