//! Few-shot transcript assembly and its two wire representations.

use serde::Serialize;

use crate::cleaner::clean;
use crate::record::StatementRecord;
use crate::sentinels::{role_header, BEGIN_OF_TEXT, END_OF_TURN};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert in formal mathematics. \
Translate the informal mathematical statement given by the user into a formal Isabelle theorem statement. \
Do NOT produce a proof: output only the theorem statement (fixes / assumes / shows). \
Make sure every hypothesis of the informal statement is captured in the formal statement.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTurn {
    pub role: Role,
    pub content: String,
}

impl MessageTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<MessageTurn>,
}

impl Transcript {
    pub fn turns(&self) -> &[MessageTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// One user turn (informal) and one assistant turn (cleaned formal) per exemplar, in order.
pub fn build_fewshot_turns(exemplars: &[StatementRecord]) -> Vec<MessageTurn> {
    let mut turns = Vec::with_capacity(exemplars.len() * 2);
    for ex in exemplars {
        turns.push(MessageTurn::new(Role::User, ex.informal_statement.as_str()));
        turns.push(MessageTurn::new(Role::Assistant, clean(&ex.formal_statement)));
    }
    turns
}

pub fn build_transcript(target: &StatementRecord, exemplars: &[StatementRecord]) -> Transcript {
    build_transcript_with_system(DEFAULT_SYSTEM_PROMPT, target, exemplars)
}

/// Like [`build_transcript`] with a caller-supplied system instruction.
pub fn build_transcript_with_system(
    system_prompt: &str,
    target: &StatementRecord,
    exemplars: &[StatementRecord],
) -> Transcript {
    let mut turns = Vec::with_capacity(exemplars.len() * 2 + 2);
    turns.push(MessageTurn::new(Role::System, system_prompt));
    turns.extend(build_fewshot_turns(exemplars));
    turns.push(MessageTurn::new(Role::User, target.informal_statement.as_str()));
    Transcript { turns }
}

/// Serialize a transcript into a single Llama 3 instruct prompt, open on an assistant header.
pub fn flatten_to_single_text(transcript: &Transcript) -> String {
    let mut out = String::from(BEGIN_OF_TEXT);
    for turn in transcript.turns() {
        out.push_str(&role_header(turn.role.as_str()));
        out.push_str(&turn.content);
        out.push_str(END_OF_TURN);
    }
    out.push_str(&role_header(Role::Assistant.as_str()));
    out
}

/// How a backend wants its prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptFormat {
    /// Structured role-tagged turns.
    Chat,
    /// One pre-serialized string with model-specific special tokens.
    Flat,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderedPrompt {
    Turns(Vec<MessageTurn>),
    Text(String),
}

impl PromptFormat {
    pub fn render(self, transcript: &Transcript) -> RenderedPrompt {
        match self {
            Self::Chat => RenderedPrompt::Turns(transcript.turns().to_vec()),
            Self::Flat => RenderedPrompt::Text(flatten_to_single_text(transcript)),
        }
    }
}

impl RenderedPrompt {
    /// Human-readable dump used by `--show-prompt`.
    pub fn display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Turns(turns) => turns
                .iter()
                .map(|t| format!("[{}]\n{}", t.role.as_str(), t.content))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}
