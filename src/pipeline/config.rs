use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;

use crate::config::{
    find_default_config, load_config, AppConfig, BackendSection, CONFIG_ENV_VAR, CONFIG_FILENAME,
};
use crate::exemplars::SubjectCatalog;
use crate::models::GenerationConfig;
use crate::prompt::DEFAULT_SYSTEM_PROMPT;

/// Command-line values that take precedence over the config file.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub dataset: Option<PathBuf>,
    pub subject: Option<String>,
    pub max_targets: Option<usize>,
    pub chat_model: Option<String>,
    pub flat_model: Option<String>,
    pub no_chat: bool,
    pub no_flat: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSettings {
    pub name: String,
    pub enabled: bool,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout: Option<Duration>,
    pub generation: GenerationConfig,
}

struct ProviderDefaults {
    name: &'static str,
    base_url: &'static str,
    api_key_env: &'static str,
    model: &'static str,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

const CHAT_DEFAULTS: ProviderDefaults = ProviderDefaults {
    name: "chat",
    base_url: "https://api.openai.com/v1",
    api_key_env: "OPENAI_API_KEY",
    model: "gpt-4o",
    temperature: 0.0,
    max_tokens: 512,
    top_p: 1.0,
};

const FLAT_DEFAULTS: ProviderDefaults = ProviderDefaults {
    name: "flat",
    base_url: "https://api.replicate.com/v1",
    api_key_env: "REPLICATE_API_TOKEN",
    model: "meta/meta-llama-3-70b-instruct",
    temperature: 0.01,
    max_tokens: 512,
    top_p: 0.9,
};

impl ProviderSettings {
    fn resolve(
        defaults: &ProviderDefaults,
        section: &BackendSection,
        model_override: Option<String>,
        disabled_by_flag: bool,
    ) -> Self {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            name: defaults.name.to_string(),
            enabled: !disabled_by_flag && section.enabled.unwrap_or(true),
            base_url: non_empty(&section.base_url).unwrap_or_else(|| defaults.base_url.to_string()),
            api_key_env: non_empty(&section.api_key_env)
                .unwrap_or_else(|| defaults.api_key_env.to_string()),
            timeout: section.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs),
            generation: GenerationConfig {
                model: non_empty(&model_override)
                    .or_else(|| non_empty(&section.model))
                    .unwrap_or_else(|| defaults.model.to_string()),
                temperature: section.temperature.unwrap_or(defaults.temperature).max(0.0),
                max_tokens: section.max_tokens.unwrap_or(defaults.max_tokens).max(1),
                top_p: section.top_p.unwrap_or(defaults.top_p).clamp(0.0, 1.0),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub config_path: Option<PathBuf>,
    pub dataset: PathBuf,
    pub subject: String,
    pub max_targets: Option<usize>,
    pub log_max_chars: usize,
    pub system_prompt: String,
    pub catalog: SubjectCatalog,
    pub chat: ProviderSettings,
    pub flat: ProviderSettings,
}

impl PipelineConfig {
    /// Locate and load the config file (flag, env var, then upward search) and apply overrides.
    pub fn from_args(args: CliOverrides) -> anyhow::Result<Self> {
        let workdir = args
            .dataset
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let cfg_file = args
            .config
            .clone()
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .or_else(|| find_default_config(&workdir, CONFIG_FILENAME));

        let file_cfg = match cfg_file.as_ref() {
            Some(p) if p.exists() => load_config(p)?,
            Some(p) if args.config.is_some() => {
                return Err(anyhow!("config not found: {}", p.display()))
            }
            _ => AppConfig::default(),
        };
        let config_path = cfg_file.filter(|p| p.exists());
        Self::from_app_config(file_cfg, config_path, args)
    }

    pub fn from_app_config(
        file_cfg: AppConfig,
        config_path: Option<PathBuf>,
        args: CliOverrides,
    ) -> anyhow::Result<Self> {
        let config_dir = config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let dataset = match args.dataset {
            Some(p) => p,
            None => {
                let p = file_cfg.pipeline.dataset.clone().ok_or_else(|| {
                    anyhow!("no dataset: pass --dataset or set pipeline.dataset in {CONFIG_FILENAME}")
                })?;
                if p.is_relative() {
                    config_dir.join(p)
                } else {
                    p
                }
            }
        };

        let subject = args
            .subject
            .or_else(|| file_cfg.pipeline.subject.clone())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "algebra".to_string());
        let max_targets = args
            .max_targets
            .or(file_cfg.pipeline.max_targets)
            .filter(|n| *n > 0);
        let log_max_chars = file_cfg.pipeline.log_max_chars.unwrap_or(240).max(16);
        let system_prompt = file_cfg
            .prompts
            .system
            .clone()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let catalog = SubjectCatalog::from_config(&file_cfg.subjects);
        // Unknown subjects are a setup error, reported before any dataset work.
        catalog.get(&subject)?;

        let chat = ProviderSettings::resolve(
            &CHAT_DEFAULTS,
            &file_cfg.models.chat,
            args.chat_model,
            args.no_chat,
        );
        let flat = ProviderSettings::resolve(
            &FLAT_DEFAULTS,
            &file_cfg.models.flat,
            args.flat_model,
            args.no_flat,
        );

        Ok(Self {
            config_path,
            dataset,
            subject,
            max_targets,
            log_max_chars,
            system_prompt,
            catalog,
            chat,
            flat,
        })
    }
}
