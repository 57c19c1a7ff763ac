//! Few-shot prompting of LLMs to translate informal math statements into Isabelle theorems.
//!
//! [`cleaner`] normalizes exemplar statements, [`prompt`] assembles transcripts (structured or
//! flattened), and [`dispatch`] sends them to the backends in [`models`].

pub mod cleaner;
pub mod config;
pub mod dispatch;
pub mod exemplars;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod record;
pub mod sentinels;
pub mod textutil;
