//! Plain-text extraction from page content streams.
//!
//! Walks the text operators of a page with a reduced text-state machine and
//! writes what is shown into lines. A vertical move starts a new line; a
//! vertical move much larger than the font size also leaves a blank line, so
//! paragraph gaps survive as `\n\n`.
//!
//! | Operator | Action |
//! |----------|--------|
//! | `BT`     | Begin text object, reset matrices |
//! | `Tf`     | Set font and size |
//! | `Tm`     | Set text matrix |
//! | `Td`/`TD`| Translate text position (`TD` also sets leading) |
//! | `T*`     | Next line |
//! | `TL`/`Tc`/`Tw`/`Tz` | Leading, character/word spacing, horizontal scale |
//! | `Tj`     | Show a string |
//! | `TJ`     | Show strings with kerning adjustments |
//! | `'`/`"`  | Next line, then show a string |

use super::backend::{number, PageId, PdfBackend, PdfValue};
use crate::PdfError;

/// Two positions whose Y coordinates differ by less than this share a line.
const Y_TOLERANCE: f32 = 1.0;

/// Approximate glyph width as a fraction of the font size.
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

/// Horizontal gap (points) between two shows on one line that reads as a space.
const MIN_WORD_GAP: f32 = 1.5;

/// A vertical move larger than this multiple of the font size is a paragraph gap.
const PARAGRAPH_GAP_FACTOR: f32 = 1.8;

/// Fraction of a glyph width a negative `TJ` kerning must exceed to count as a space.
const TJ_SPACE_FACTOR: f32 = 0.3;

const IDENTITY_MATRIX: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

#[derive(Debug, Clone)]
struct TextState {
    font_key: Vec<u8>,
    font_size: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    horiz_scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_key: Vec::new(),
            font_size: 0.0,
            text_matrix: IDENTITY_MATRIX,
            line_matrix: IDENTITY_MATRIX,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn x(&self) -> f32 {
        self.text_matrix[4]
    }

    fn y(&self) -> f32 {
        self.text_matrix[5]
    }

    /// Rendered font size, including the vertical scale of the text matrix.
    fn effective_font_size(&self) -> f32 {
        let scale = (self.text_matrix[1].powi(2) + self.text_matrix[3].powi(2)).sqrt();
        (self.font_size * scale).abs()
    }

    fn glyph_width(&self) -> f32 {
        self.font_size * APPROX_CHAR_WIDTH_RATIO * self.horiz_scale
    }

    fn advance_x(&mut self, dx: f32) {
        self.text_matrix[4] += dx * self.text_matrix[0];
        self.text_matrix[5] += dx * self.text_matrix[1];
    }

    fn translate_line(&mut self, tx: f32, ty: f32) {
        let m = self.line_matrix;
        self.line_matrix[4] = m[0] * tx + m[2] * ty + m[4];
        self.line_matrix[5] = m[1] * tx + m[3] * ty + m[5];
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.translate_line(0.0, -self.leading);
    }

    /// Move past `text` as if it had been drawn.
    fn advance_after_show(&mut self, text: &str) {
        let dx: f32 = text
            .chars()
            .map(|ch| {
                let spacing = if ch == ' ' { self.word_spacing } else { 0.0 };
                self.glyph_width() + self.char_spacing + spacing
            })
            .sum();
        self.advance_x(dx);
    }
}

/// Accumulates shown text into lines.
#[derive(Debug, Default)]
struct LineWriter {
    lines: Vec<String>,
    current: String,
    last_y: Option<f32>,
    end_x: f32,
}

impl LineWriter {
    fn break_line(&mut self) {
        let line = self.current.trim_end().to_string();
        self.current.clear();
        if !line.is_empty() {
            self.lines.push(line);
        }
    }

    fn push_space(&mut self) {
        if !self.current.is_empty() && !self.current.ends_with(char::is_whitespace) {
            self.current.push(' ');
        }
    }

    /// Position the pen before new text at `(x, y)`.
    fn place(&mut self, x: f32, y: f32, font_size: f32) {
        match self.last_y {
            Some(last) if (last - y).abs() > Y_TOLERANCE => {
                self.break_line();
                let gap = (last - y).abs();
                let paragraph_gap = font_size > 0.0 && gap > font_size * PARAGRAPH_GAP_FACTOR;
                if paragraph_gap && self.lines.last().is_some_and(|l| !l.is_empty()) {
                    self.lines.push(String::new());
                }
            }
            Some(_) if x - self.end_x > MIN_WORD_GAP => self.push_space(),
            _ => {}
        }
        self.last_y = Some(y);
    }

    fn write(&mut self, text: &str, end_x: f32) {
        self.current.push_str(text);
        self.end_x = end_x;
    }

    fn finish(mut self) -> String {
        self.break_line();
        while self.lines.last().is_some_and(String::is_empty) {
            self.lines.pop();
        }
        self.lines.join("\n")
    }
}

fn decode_operand(
    val: &PdfValue,
    backend: &dyn PdfBackend,
    page_id: PageId,
    font_key: &[u8],
) -> String {
    match val {
        PdfValue::Str(bytes) => backend.decode_text(page_id, font_key, bytes),
        _ => String::new(),
    }
}

fn show_string(
    operand: &PdfValue,
    backend: &dyn PdfBackend,
    page_id: PageId,
    state: &mut TextState,
    out: &mut LineWriter,
) {
    let text = decode_operand(operand, backend, page_id, &state.font_key);
    if text.is_empty() {
        return;
    }
    out.place(state.x(), state.y(), state.effective_font_size());
    state.advance_after_show(&text);
    out.write(&text, state.x());
}

/// `TJ` arrays mix strings with kerning adjustments in thousandths of a text
/// space unit; a large negative adjustment is a word gap.
fn show_array(
    elements: &[PdfValue],
    backend: &dyn PdfBackend,
    page_id: PageId,
    state: &mut TextState,
    out: &mut LineWriter,
) {
    let mut placed = false;
    for elem in elements {
        match elem {
            PdfValue::Str(_) => {
                let fragment = decode_operand(elem, backend, page_id, &state.font_key);
                if fragment.is_empty() {
                    continue;
                }
                if !placed {
                    out.place(state.x(), state.y(), state.effective_font_size());
                    placed = true;
                }
                state.advance_after_show(&fragment);
                out.write(&fragment, state.x());
            }
            other => {
                if let Some(adj) = number(other) {
                    let dx = -adj / 1000.0 * state.font_size * state.horiz_scale;
                    if placed && dx > state.glyph_width() * TJ_SPACE_FACTOR {
                        out.push_space();
                    }
                    state.advance_x(dx);
                    if placed {
                        out.end_x = state.x();
                    }
                }
            }
        }
    }
}

fn set_font(operands: &[PdfValue], state: &mut TextState) {
    if let [PdfValue::Name(key), size, ..] = operands {
        state.font_key = key.clone();
        state.font_size = number(size).unwrap_or(0.0);
    }
}

fn set_matrix(operands: &[PdfValue], state: &mut TextState) {
    let vals: Vec<f32> = operands.iter().take(6).filter_map(number).collect();
    if let Ok(matrix) = <[f32; 6]>::try_from(vals) {
        state.text_matrix = matrix;
        state.line_matrix = matrix;
    }
}

fn pair(operands: &[PdfValue]) -> Option<(f32, f32)> {
    match operands {
        [a, b, ..] => Some((number(a)?, number(b)?)),
        _ => None,
    }
}

/// Extract the text of one page, one visual line per output line.
pub fn extract_page_text(backend: &dyn PdfBackend, page_id: PageId) -> Result<String, PdfError> {
    let raw = backend.page_content(page_id)?;
    let ops = backend.decode_content(&raw)?;

    let mut state = TextState::default();
    let mut out = LineWriter::default();

    for op in &ops {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            "BT" => {
                state.text_matrix = IDENTITY_MATRIX;
                state.line_matrix = IDENTITY_MATRIX;
            }
            "Tf" => set_font(operands, &mut state),
            "Tm" => set_matrix(operands, &mut state),
            "Td" => {
                if let Some((tx, ty)) = pair(operands) {
                    state.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let Some((tx, ty)) = pair(operands) {
                    state.leading = -ty;
                    state.translate_line(tx, ty);
                }
            }
            "T*" => state.next_line(),
            "TL" => {
                if let Some(v) = operands.first().and_then(number) {
                    state.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = operands.first().and_then(number) {
                    state.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = operands.first().and_then(number) {
                    state.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = operands.first().and_then(number) {
                    state.horiz_scale = v / 100.0;
                }
            }
            "Tj" => {
                if let Some(first) = operands.first() {
                    show_string(first, backend, page_id, &mut state, &mut out);
                }
            }
            "TJ" => {
                if let Some(PdfValue::Array(elements)) = operands.first() {
                    show_array(elements, backend, page_id, &mut state, &mut out);
                }
            }
            "'" => {
                state.next_line();
                if let Some(first) = operands.first() {
                    show_string(first, backend, page_id, &mut state, &mut out);
                }
            }
            "\"" => {
                if let [aw, ac, text, ..] = operands {
                    if let Some(aw) = number(aw) {
                        state.word_spacing = aw;
                    }
                    if let Some(ac) = number(ac) {
                        state.char_spacing = ac;
                    }
                    state.next_line();
                    show_string(text, backend, page_id, &mut state, &mut out);
                }
            }
            _ => {}
        }
    }

    Ok(out.finish())
}
