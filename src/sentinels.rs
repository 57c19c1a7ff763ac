use once_cell::sync::Lazy;
use regex::Regex;

/// Returned by the dispatcher in place of model output when a provider call fails.
pub const TRANSLATION_FAILED: &str = "<<TRANSLATION_FAILED>>";

// Llama 3 instruct prompt format. These must match the model's tokenizer byte for byte.
pub const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
pub const START_HEADER: &str = "<|start_header_id|>";
pub const END_HEADER: &str = "<|end_header_id|>";
pub const END_OF_TURN: &str = "<|eot_id|>";

pub const SPECIAL_TOKENS: [&str; 4] = [BEGIN_OF_TEXT, START_HEADER, END_HEADER, END_OF_TURN];

static SPECIAL_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    let toks = SPECIAL_TOKENS
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&toks).expect("special token regex")
});

pub fn role_header(role: &str) -> String {
    format!("{START_HEADER}{role}{END_HEADER}\n\n")
}

#[inline]
pub fn is_failure(text: &str) -> bool {
    text == TRANSLATION_FAILED
}

/// True when `text` carries any of the flattened-prompt special tokens.
///
/// Dataset text containing these would be indistinguishable from turn boundaries once flattened.
pub fn contains_special_tokens(text: &str) -> bool {
    SPECIAL_TOKEN_RE.is_match(text)
}
