//! Normalization of raw Isabelle theorem source into a prompt exemplar.
//!
//! Every stage is line-anchored and degrades to the identity when its pattern is absent, so
//! [`clean`] never fails.

use once_cell::sync::Lazy;
use regex::Regex;

pub const THEOREM_KEYWORD: &str = "theorem";
pub const CONCLUSION_KEYWORD: &str = "shows";

// Stage 1 and stage 3 share this pattern so they always agree on which line is the declaration.
static THEOREM_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^(\s*){THEOREM_KEYWORD}\b")).expect("theorem line regex")
});
static CONCLUSION_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\s*{CONCLUSION_KEYWORD}\b")).expect("conclusion line regex")
});

/// Drop the theory header, the proof body and the theorem's name.
///
/// Input without a `theorem` line is returned unchanged.
pub fn clean(raw: &str) -> String {
    if first_theorem_line(raw).is_none() {
        return raw.to_string();
    }
    let s = drop_preamble(raw);
    let s = drop_proof_body(&s);
    strip_theorem_name(&s)
}

fn first_theorem_line(text: &str) -> Option<usize> {
    text.split('\n').position(|l| THEOREM_LINE_RE.is_match(l))
}

/// Discard every line before the first `theorem` line.
pub fn drop_preamble(raw: &str) -> String {
    match first_theorem_line(raw) {
        Some(start) => raw.split('\n').skip(start).collect::<Vec<_>>().join("\n"),
        None => raw.to_string(),
    }
}

/// Keep lines up to and including the first `shows` line.
pub fn drop_proof_body(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    match lines.iter().position(|l| CONCLUSION_LINE_RE.is_match(l)) {
        Some(end) => lines[..=end].join("\n"),
        None => text.to_string(),
    }
}

/// Replace the first `theorem <name...>` line with the bare keyword, keeping its indentation.
pub fn strip_theorem_name(text: &str) -> String {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let Some(idx) = lines.iter().position(|l| THEOREM_LINE_RE.is_match(l)) else {
        return text.to_string();
    };
    let indent = THEOREM_LINE_RE
        .captures(&lines[idx])
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    lines[idx] = format!("{indent}{THEOREM_KEYWORD}");
    lines.join("\n")
}
