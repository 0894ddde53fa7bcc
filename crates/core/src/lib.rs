//! Core library for converteai
//!
//! This crate implements the **Functional Core** of the converteai service,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! The project is split across three crates:
//!
//! - **`converteai_core`** (this crate): Pure transformation functions with zero I/O
//! - **`pdf`**: PDF parsing and plain-text extraction
//! - **`converteai`**: File storage, HTTP server and CLI (the Imperative Shell)
//!
//! Everything here takes its inputs as values (text, options, the current time,
//! a random number generator) and returns values. Writing files, reading the
//! clock and talking to clients all happen in the shell.
//!
//! # Pipeline
//!
//! ```text
//! extracted text ──segment──▶ [Block] ──assemble──▶ Document ──docx::to_bytes──▶ .docx bytes
//! ```
//!
//! # Module Organization
//!
//! - [`options`]: Formatting options and their defaults
//! - [`segment`]: Heading detection and paragraph accumulation over raw lines
//! - [`document`]: Mapping of blocks onto a styled document model
//! - [`docx`]: Office Open XML encoding of the document model
//! - [`files`]: Upload validation, unique file names and size formatting
//! - [`limits`]: Fixed-window rate limiting, IP blocking and request screening
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use converteai_core::{build_document, docx, FormattingOptions};
//!
//! let options = FormattingOptions::default().with_title("Report");
//! let document = build_document("INTRODUCTION\n\nFirst line.\n", &options);
//! let bytes = docx::to_bytes(&document)?;
//! ```

pub mod document;
pub mod docx;
pub mod files;
pub mod limits;
pub mod options;
pub mod segment;

pub use document::{assemble, build_document, Document, Element};
pub use options::FormattingOptions;
pub use segment::{segment, Block};
