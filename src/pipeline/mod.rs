mod config;
mod translator;

pub use config::{CliOverrides, PipelineConfig, ProviderSettings};
pub use translator::{compare, Provider, RunSummary, TranslatorPipeline};
