use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{anyhow, Context};

use super::config::{PipelineConfig, ProviderSettings};
use crate::cleaner::clean;
use crate::dispatch::Dispatcher;
use crate::exemplars::SubjectSplit;
use crate::models::{DispatchError, GenerationConfig, OpenAiChatBackend, ReplicateBackend, TextBackend};
use crate::progress::ConsoleProgress;
use crate::prompt::{build_transcript_with_system, flatten_to_single_text, PromptFormat};
use crate::record::{Dataset, StatementRecord};
use crate::sentinels::{contains_special_tokens, TRANSLATION_FAILED};
use crate::textutil::clip_for_log;

/// A configured backend plus the sampling settings used for every call to it.
pub struct Provider {
    pub backend: Box<dyn TextBackend>,
    pub generation: GenerationConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub targets: usize,
    /// Failed calls per provider name. Providers with no failures are listed with 0.
    pub failures: BTreeMap<String, usize>,
}

pub struct TranslatorPipeline {
    cfg: PipelineConfig,
    progress: ConsoleProgress,
}

impl TranslatorPipeline {
    pub fn new(cfg: PipelineConfig, progress: ConsoleProgress) -> Self {
        Self { cfg, progress }
    }

    pub fn load_dataset(&self) -> anyhow::Result<Dataset> {
        let dataset = Dataset::load(&self.cfg.dataset)?;
        self.progress.info(format!(
            "Loaded {} records from {}",
            dataset.len(),
            self.cfg.dataset.display()
        ));
        Ok(dataset)
    }

    pub fn split(&self, dataset: &Dataset) -> anyhow::Result<SubjectSplit> {
        let spec = self.cfg.catalog.get(&self.cfg.subject)?;
        let split = SubjectSplit::build(dataset, &self.cfg.subject, spec)
            .with_context(|| format!("build exemplar set for {}", self.cfg.subject))?;
        self.progress.info(format!(
            "Subject {}: {} records = {} exemplars + {} to translate",
            split.subject,
            split.full_len,
            split.exemplars.len(),
            split.evaluation.len()
        ));
        Ok(split)
    }

    /// Providers whose credentials are present. A missing credential only drops that provider.
    pub fn connect_providers(&self) -> Vec<Provider> {
        let mut providers = Vec::new();
        for (settings, format) in [
            (&self.cfg.chat, PromptFormat::Chat),
            (&self.cfg.flat, PromptFormat::Flat),
        ] {
            if !settings.enabled {
                self.progress.info(format!("{} provider disabled", settings.name));
                continue;
            }
            match connect(settings, format) {
                Ok(backend) => providers.push(Provider {
                    backend,
                    generation: settings.generation.clone(),
                }),
                Err(err) => self
                    .progress
                    .warn(format!("{err}; skipping {} provider", settings.name)),
            }
        }
        providers
    }

    /// Load, split and translate, printing the comparison to `out`.
    pub fn run(&self, out: &mut dyn Write) -> anyhow::Result<RunSummary> {
        let dataset = self.load_dataset()?;
        let split = self.split(&dataset)?;
        let providers = self.connect_providers();
        if providers.is_empty() {
            self.progress
                .warn("no provider available; printing references only");
        }
        compare(
            &split,
            &providers,
            &self.cfg.system_prompt,
            self.cfg.max_targets,
            self.cfg.log_max_chars,
            &self.progress,
            out,
        )
    }

    /// Print both prompt representations for one record. No network calls.
    pub fn show_prompt(&self, id: &str, out: &mut dyn Write) -> anyhow::Result<()> {
        let dataset = self.load_dataset()?;
        let split = self.split(&dataset)?;
        let target = dataset
            .get(id)
            .ok_or_else(|| anyhow!("record not found: {id}"))?;
        if split.exemplars.iter().any(|e| e.id == id) {
            self.progress
                .warn(format!("{id} is one of the exemplars; its answer is in the prompt"));
        }
        let transcript = build_transcript_with_system(&self.cfg.system_prompt, target, &split.exemplars);
        writeln!(out, "### chat transcript ({} turns)\n", transcript.len())?;
        writeln!(out, "{}\n", PromptFormat::Chat.render(&transcript).display())?;
        writeln!(out, "### flattened prompt\n")?;
        writeln!(out, "{}", flatten_to_single_text(&transcript))?;
        Ok(())
    }

    pub fn list_subjects(&self, out: &mut dyn Write) -> anyhow::Result<()> {
        let dataset = self.load_dataset()?;
        for name in self.cfg.catalog.names() {
            let spec = self.cfg.catalog.get(name)?;
            match SubjectSplit::build(&dataset, name, spec) {
                Ok(split) => writeln!(
                    out,
                    "{name:<16} filter={:<14} full={:<5} exemplars={:<3} evaluation={}",
                    spec.id_filter,
                    split.full_len,
                    split.exemplars.len(),
                    split.evaluation.len()
                )?,
                Err(err) => writeln!(out, "{name:<16} filter={:<14} error: {err}", spec.id_filter)?,
            }
        }
        Ok(())
    }
}

fn connect(
    settings: &ProviderSettings,
    format: PromptFormat,
) -> Result<Box<dyn TextBackend>, DispatchError> {
    match format {
        PromptFormat::Chat => {
            OpenAiChatBackend::from_env(&settings.name, &settings.base_url, &settings.api_key_env)
                .map(|b| Box::new(b.with_timeout(settings.timeout)) as Box<dyn TextBackend>)
        }
        PromptFormat::Flat => {
            ReplicateBackend::from_env(&settings.name, &settings.base_url, &settings.api_key_env)
                .map(|b| Box::new(b.with_timeout(settings.timeout)) as Box<dyn TextBackend>)
        }
    }
}

/// Translate each evaluation record with every provider, in order, one call at a time.
pub fn compare(
    split: &SubjectSplit,
    providers: &[Provider],
    system_prompt: &str,
    max_targets: Option<usize>,
    log_max_chars: usize,
    progress: &ConsoleProgress,
    out: &mut dyn Write,
) -> anyhow::Result<RunSummary> {
    let dispatcher = Dispatcher::new(progress);
    let total = max_targets
        .map(|n| n.min(split.evaluation.len()))
        .unwrap_or(split.evaluation.len());

    let mut summary = RunSummary {
        targets: 0,
        failures: providers
            .iter()
            .map(|p| (p.backend.name().to_string(), 0))
            .collect(),
    };

    for (idx, target) in split.evaluation.iter().take(total).enumerate() {
        progress.progress("Translating", idx, total);
        if contains_special_tokens(&target.informal_statement) {
            progress.warn(format!(
                "{}: informal statement contains prompt special tokens",
                target.id
            ));
        }
        let transcript = build_transcript_with_system(system_prompt, target, &split.exemplars);

        write_target_header(out, idx + 1, total, target)?;
        for provider in providers {
            let backend = provider.backend.as_ref();
            let result = match backend.format() {
                PromptFormat::Chat => {
                    dispatcher.try_translate(backend, &transcript, &provider.generation)
                }
                PromptFormat::Flat => dispatcher.try_translate_flat(
                    backend,
                    &flatten_to_single_text(&transcript),
                    &provider.generation,
                ),
            };
            // Failures come from the typed result, never from comparing text to the sentinel.
            let output = match result {
                Ok(text) => {
                    progress.info(format!(
                        "{} {}: {}",
                        target.id,
                        backend.name(),
                        clip_for_log(&text, log_max_chars)
                    ));
                    text
                }
                Err(err) => {
                    dispatcher.report_failure(backend, &err);
                    *summary.failures.entry(backend.name().to_string()).or_default() += 1;
                    TRANSLATION_FAILED.to_string()
                }
            };
            writeln!(
                out,
                "--- {} ({}) ---\n{}\n",
                backend.name(),
                provider.generation.model,
                output.trim()
            )?;
        }
        summary.targets += 1;
    }
    progress.progress("Translating", total, total);

    writeln!(out, "=== {} targets ===", summary.targets)?;
    for (name, failed) in &summary.failures {
        writeln!(out, "{name}: {failed} failed")?;
    }
    Ok(summary)
}

fn write_target_header(
    out: &mut dyn Write,
    n: usize,
    total: usize,
    target: &StatementRecord,
) -> anyhow::Result<()> {
    writeln!(out, "=== [{n}/{total}] {} ===", target.id)?;
    writeln!(out, "Informal:\n{}\n", target.informal_statement.trim())?;
    // Reference is the target's own statement, never another record's.
    writeln!(out, "Reference:\n{}\n", clean(&target.formal_statement))?;
    Ok(())
}
