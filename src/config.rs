use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILENAME: &str = "fewshot-formalizer.toml";
pub const CONFIG_ENV_VAR: &str = "FEWSHOT_FORMALIZER_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub models: ModelsSection,
    /// Extra or replacement subjects, keyed by subject tag.
    #[serde(default)]
    pub subjects: BTreeMap<String, SubjectSection>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    /// JSON / JSON Lines file of statement records. Relative to the config file.
    #[serde(default)]
    pub dataset: Option<PathBuf>,
    #[serde(default)]
    pub subject: Option<String>,
    /// Translate at most N evaluation records per run.
    #[serde(default)]
    pub max_targets: Option<usize>,
    #[serde(default)]
    pub log_max_chars: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    /// Replaces the built-in system instruction.
    #[serde(default)]
    pub system: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ModelsSection {
    #[serde(default)]
    pub chat: BackendSection,
    #[serde(default)]
    pub flat: BackendSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BackendSection {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API credential.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Request timeout; unset leaves the HTTP client's default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default, PartialEq, Eq)]
pub struct SubjectSection {
    /// Id substring selecting the subject's records (default: the subject tag).
    #[serde(default)]
    pub id_filter: Option<String>,
    #[serde(default)]
    pub exemplars: Vec<String>,
}

/// Nearest `filename` in `start_dir` or one of its first `max_levels` ancestors.
pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .take(max_levels + 1)
        .map(|dir| dir.join(filename))
        .find(|candidate| candidate.is_file())
}

/// Search from the current directory, then the dataset's directory, then the executable's.
pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let roots = [
        (std::env::current_dir().ok(), 8),
        (Some(workdir.to_path_buf()), 8),
        (exe_dir, 10),
    ];
    roots
        .into_iter()
        .filter_map(|(dir, levels)| dir.map(|d| (d, levels)))
        .find_map(|(dir, levels)| find_file_upwards(&dir, filename, levels))
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parse config: {}", path.display()))
}

/// Write the commented default config into `dir`. Existing files are kept unless `force`.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

pub const DEFAULT_CONFIG_TOML: &str = r#"[pipeline]
# JSON Lines (or JSON array) with id / informal_statement / formal_statement per record.
dataset = "minif2f_valid.jsonl"
subject = "algebra"
max_targets = 5
log_max_chars = 240

[prompts]
# system = "Translate the informal statement into an Isabelle theorem statement. No proof."

# Chat-style provider: OpenAI-compatible /chat/completions.
[models.chat]
enabled = true
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
model = "gpt-4o"
temperature = 0.0
max_tokens = 512
top_p = 1.0
# timeout_secs = 120

# Flattened-prompt provider: Replicate predictions API, Llama 3 prompt format.
[models.flat]
enabled = true
base_url = "https://api.replicate.com/v1"
api_key_env = "REPLICATE_API_TOKEN"
model = "meta/meta-llama-3-70b-instruct"
temperature = 0.01
max_tokens = 512
top_p = 0.9

# Curated exemplars, in prompt order. Built-ins exist for "algebra" and "number_theory";
# entries here replace them or add new subjects.
# [subjects.algebra]
# id_filter = "algebra"
# exemplars = ["mathd_algebra_478", "mathd_algebra_141", "mathd_algebra_209", "mathd_algebra_33"]
#
# [subjects.imo]
# id_filter = "imo_"
# exemplars = ["imo_1959_p1", "imo_1964_p1_2"]
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let cfg: AppConfig = toml::from_str(DEFAULT_CONFIG_TOML).expect("parse default");
        assert_eq!(cfg.pipeline.subject.as_deref(), Some("algebra"));
        assert_eq!(cfg.models.chat.model.as_deref(), Some("gpt-4o"));
        assert_eq!(cfg.models.flat.api_key_env.as_deref(), Some("REPLICATE_API_TOKEN"));
        assert_eq!(cfg.models.flat.top_p, Some(0.9));
        assert!(cfg.subjects.is_empty());
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("parse empty");
        assert!(cfg.pipeline.dataset.is_none());
        assert!(cfg.models.chat.enabled.is_none());
    }

    #[test]
    fn subjects_section_parses() {
        let cfg: AppConfig = toml::from_str(
            "[subjects.imo]\nid_filter = \"imo_\"\nexemplars = [\"imo_1959_p1\"]\n",
        )
        .expect("parse");
        assert_eq!(
            cfg.subjects.get("imo"),
            Some(&SubjectSection {
                id_filter: Some("imo_".to_string()),
                exemplars: vec!["imo_1959_p1".to_string()],
            })
        );
    }

    #[test]
    fn init_writes_once_unless_forced() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = init_default_config(dir.path(), false).expect("init");
        assert!(path.ends_with(CONFIG_FILENAME));

        std::fs::write(&path, "# edited\n").expect("edit");
        init_default_config(dir.path(), false).expect("init again");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "# edited\n");

        init_default_config(dir.path(), true).expect("force");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.pipeline.max_targets, Some(5));
    }

    #[test]
    fn finds_file_in_parent_dirs() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join(CONFIG_FILENAME), "").expect("write");
        let found = find_file_upwards(&nested, CONFIG_FILENAME, 4).expect("found");
        assert_eq!(found, dir.path().join(CONFIG_FILENAME));
        assert!(find_file_upwards(&nested, CONFIG_FILENAME, 1).is_none());
    }

    #[test]
    fn directory_named_like_the_config_is_skipped() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let nested = dir.path().join("a");
        std::fs::create_dir_all(nested.join(CONFIG_FILENAME)).expect("mkdir");
        std::fs::write(dir.path().join(CONFIG_FILENAME), "").expect("write");
        let found = find_file_upwards(&nested, CONFIG_FILENAME, 2).expect("found");
        assert_eq!(found, dir.path().join(CONFIG_FILENAME));
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[pipeline\n").expect("write");
        let err = load_config(&path).expect_err("bad toml");
        assert!(err.to_string().contains(&path.display().to_string()));
    }
}
