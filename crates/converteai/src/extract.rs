use std::path::PathBuf;

use colored::Colorize;
use pdf::ExtractOptions;

use crate::prelude::{eprintln, println, *};

#[derive(Debug, clap::Parser)]
#[command(name = "extract")]
#[command(about = "Print the text extracted from a PDF file")]
pub struct App {
    /// PDF file to read
    input: PathBuf,

    /// Pages after this one are ignored
    #[arg(long, default_value_t = pdf::DEFAULT_MAX_PAGES)]
    max_pages: usize,

    /// Output text and metadata as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let bytes = tokio::fs::read(&app.input)
        .await
        .wrap_err_with(|| f!("Failed to read {}", app.input.display()))?;

    if !pdf::is_pdf(&bytes) {
        return Err(eyre!("{} is not a PDF file", app.input.display()));
    }

    let options = ExtractOptions {
        max_pages: app.max_pages,
    };
    let extracted = tokio::task::spawn_blocking(move || pdf::extract_text(&bytes, options))
        .await??;

    if app.json {
        println!("{}", serde_json::to_string_pretty(&extracted)?);
        return Ok(());
    }

    if global.verbose {
        let meta = &extracted.metadata;
        if let Some(title) = &meta.title {
            eprintln!("{}: {}", "Title".green(), title.bright_white().bold());
        }
        if let Some(author) = &meta.author {
            eprintln!("{}: {}", "Author".green(), author.bright_white());
        }
        eprintln!(
            "{}: {}",
            "Pages".green(),
            f!("{} of {}", extracted.pages_read, extracted.page_count).bright_white()
        );
        eprintln!("{}", "=".repeat(80).bright_cyan());
    }
    println!("{}", extracted.text);

    Ok(())
}
