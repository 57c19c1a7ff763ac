use once_cell::sync::Lazy;
use regex::Regex;

static WS_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws run"));

/// Collapse whitespace to single spaces and cut to `max_chars`, for one-line log messages.
pub fn clip_for_log(text: &str, max_chars: usize) -> String {
    let flat = WS_RUN_RE.replace_all(text.trim(), " ");
    if flat.chars().count() <= max_chars {
        return flat.into_owned();
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push('…');
    out
}
