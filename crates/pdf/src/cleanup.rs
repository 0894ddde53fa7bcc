use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

const LIGATURES: [(char, &str); 5] = [
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
];

const BULLETS: [char; 4] = ['\u{25CF}', '\u{25CB}', '\u{25A0}', '\u{25AA}'];

fn replace_ligatures(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match LIGATURES.iter().find(|(lig, _)| *lig == ch) {
            Some((_, expansion)) => out.push_str(expansion),
            None if BULLETS.contains(&ch) => out.push('\u{2022}'),
            None if ch == '\u{FFFD}' => {}
            None => out.push(ch),
        }
    }
    out
}

/// Rejoin words split by a hyphen at the end of a line: `infor-\nmation`.
fn join_hyphenated(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\p{L})-[ \t]*\n[ \t]*(\p{Ll})").unwrap());
    re.replace_all(text, "$1$2").into_owned()
}

/// Collapse runs of spaces/tabs, strip line ends and cap blank runs at one line.
fn normalize_whitespace(text: &str) -> String {
    static RE_SPACES: OnceLock<Regex> = OnceLock::new();
    static RE_BLANKS: OnceLock<Regex> = OnceLock::new();
    let re_spaces = RE_SPACES.get_or_init(|| Regex::new(r"[ \t\u{A0}]+").unwrap());
    let re_blanks = RE_BLANKS.get_or_init(|| Regex::new(r"\n{3,}").unwrap());

    let lines: Vec<String> = text
        .lines()
        .map(|line| re_spaces.replace_all(line, " ").trim().to_string())
        .collect();
    re_blanks.replace_all(&lines.join("\n"), "\n\n").into_owned()
}

/// Clean up extracted PDF text.
///
/// NFC normalization, ligature expansion, bullet standardization, removal of
/// U+FFFD, hyphenation repair and whitespace normalization, in that order.
pub fn cleanup_text(text: &str) -> String {
    let normalized: String = text.nfc().collect();
    let expanded = replace_ligatures(&normalized);
    let joined = join_hyphenated(&expanded);
    normalize_whitespace(&joined).trim().to_string()
}
