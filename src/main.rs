use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use fewshot_formalizer::config::init_default_config;
use fewshot_formalizer::pipeline::{CliOverrides, PipelineConfig, TranslatorPipeline};
use fewshot_formalizer::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "fewshot-formalizer")]
#[command(about = "Few-shot informal-to-Isabelle statement translation with two LLM providers", long_about = None)]
struct Args {
    /// Generate a default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Config file path (default: search for fewshot-formalizer.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Statement records (JSON Lines or JSON array)
    #[arg(short, long, value_name = "JSON")]
    dataset: Option<PathBuf>,

    /// Subject tag selecting the curated exemplars (e.g. algebra, number_theory)
    #[arg(short, long)]
    subject: Option<String>,

    /// Translate at most N records
    #[arg(short = 'n', long)]
    max_targets: Option<usize>,

    /// Model id for the chat provider
    #[arg(long)]
    chat_model: Option<String>,

    /// Model id for the flattened-prompt provider
    #[arg(long)]
    flat_model: Option<String>,

    /// Skip the chat provider
    #[arg(long)]
    no_chat: bool,

    /// Skip the flattened-prompt provider
    #[arg(long)]
    no_flat: bool,

    /// Print the prompt built for record ID (both representations) and exit; no API calls
    #[arg(long, value_name = "ID")]
    show_prompt: Option<String>,

    /// List subjects with their exemplar/evaluation sizes and exit
    #[arg(long)]
    list_subjects: bool,

    /// No status lines on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let cfg = PipelineConfig::from_args(CliOverrides {
        config: args.config,
        dataset: args.dataset,
        subject: args.subject,
        max_targets: args.max_targets,
        chat_model: args.chat_model,
        flat_model: args.flat_model,
        no_chat: args.no_chat,
        no_flat: args.no_flat,
    })
    .context("build config")?;
    if let Some(p) = cfg.config_path.as_ref() {
        progress.info(format!("Config: {}", p.display()));
    }

    let pipeline = TranslatorPipeline::new(cfg, progress);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if args.list_subjects {
        pipeline.list_subjects(&mut out)?;
    } else if let Some(id) = args.show_prompt.as_deref() {
        pipeline.show_prompt(id, &mut out)?;
    } else {
        pipeline.run(&mut out)?;
    }
    out.flush().context("flush stdout")?;
    Ok(())
}
