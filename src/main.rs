//! crop-profile: fill the gaps of crop profile collections with generated data.
//!
//! - `crop-profile complete cultivos.json`: complete every crop, writing `cultivos_completado.json`
//! - `crop-profile expand cultivos.json`: expand base records into detailed profiles, writing `cultivos_expandido_ia.json`
//! - `crop-profile diagnose cultivos.json`: report the file's structure and problems
//! - `crop-profile export cultivos_completado.json`: write the lightweight versions
//! - `crop-profile add cultivos_nuevos.json`: generate full profiles for new crops

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crop_profile_builder::{
    diagnose_file, export_versions, AddTargets, AnthropicClient, Completer, CompleterConfig,
    CropCollection, CropSeed, ReferenceSchema, RunSummary,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "crop-profile",
    version,
    about = "Complete crop profiles by generating only their missing sections"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Complete the missing sections of every crop in a collection
    Complete {
        /// Collection file (`{"cultivos": {...}}`)
        input: PathBuf,

        /// Output file [default: <input>_completado.json]
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Complete reference profile whose shape defines the expected sections
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Only process the first N crops
        #[arg(long)]
        limit: Option<usize>,

        /// JSON file with completer settings
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        api: ApiArgs,
    },

    /// Expand every base record into a detailed profile
    Expand {
        /// Collection of base records (`{"cultivos": {...}}`)
        input: PathBuf,

        /// Output file [default: <input>_expandido_ia.json]
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Only process the first N crops
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        api: ApiArgs,
    },

    /// Report the structure of a collection file
    Diagnose { file: PathBuf },

    /// Write basic, medium and per-crop versions of a complete collection
    Export {
        file: PathBuf,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Generate full profiles for new crops and add them to the data files
    Add {
        /// JSON mapping of crop name to seed (scientific name, family, category)
        seeds: PathBuf,

        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        #[arg(long)]
        reference: Option<PathBuf>,

        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        api: ApiArgs,
    },
}

#[derive(clap::Args)]
struct ApiArgs {
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model id, overrides the config file
    #[arg(long)]
    model: Option<String>,
}

impl ApiArgs {
    fn client(&self) -> Result<AnthropicClient> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(AnthropicClient::new(key.to_string())),
            _ => Ok(AnthropicClient::from_env()?),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Complete {
            input,
            output,
            reference,
            limit,
            config,
            api,
        } => complete(input, output, reference, limit, config, api).await,
        Command::Expand {
            input,
            output,
            limit,
            config,
            api,
        } => expand(input, output, limit, config, api).await,
        Command::Diagnose { file } => {
            let diagnosis = diagnose_file(&file)
                .with_context(|| format!("failed to diagnose {}", file.display()))?;
            println!("{}", file.display());
            print!("{}", diagnosis);
            Ok(())
        }
        Command::Export { file, out_dir } => {
            let collection = CropCollection::load(&file)
                .with_context(|| format!("failed to load {}", file.display()))?;
            let summary = export_versions(&collection, &out_dir)?;
            println!(
                "{} crops exported: {}, {}, {}/",
                summary.crops,
                summary.basic.display(),
                summary.medium.display(),
                summary.individual_dir.display()
            );
            Ok(())
        }
        Command::Add {
            seeds,
            data_dir,
            reference,
            config,
            api,
        } => add(seeds, data_dir, reference, config, api).await,
    }
}

fn load_config(path: Option<&Path>, model: Option<String>) -> Result<CompleterConfig> {
    let mut config = match path {
        Some(path) => CompleterConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CompleterConfig::default(),
    };
    if let Some(model) = model {
        config.model = model;
    }
    Ok(config)
}

fn load_schema(reference: Option<&Path>) -> Result<ReferenceSchema> {
    match reference {
        Some(path) => ReferenceSchema::load_or_default(path)
            .with_context(|| format!("failed to load reference {}", path.display())),
        None => Ok(ReferenceSchema::default()),
    }
}

fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cultivos".to_string());
    input.with_file_name(format!("{}_{}.json", stem, suffix))
}

/// Cancels the token on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Ctrl-C received, finishing up");
            token.cancel();
        }
    });
    cancel
}

async fn complete(
    input: PathBuf,
    output: Option<PathBuf>,
    reference: Option<PathBuf>,
    limit: Option<usize>,
    config: Option<PathBuf>,
    api: ApiArgs,
) -> Result<()> {
    let mut config = load_config(config.as_deref(), api.model.clone())?;
    if limit.is_some() {
        config.limit = limit;
    }
    let schema = load_schema(reference.as_deref())?;
    let collection = CropCollection::load(&input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    let output = output.unwrap_or_else(|| default_output(&input, "completado"));

    let completer = Completer::new(api.client()?, schema, config);
    let summary = completer.run(&collection, &output, &cancel_on_ctrl_c()).await?;
    print_summary(&summary, "completed");
    Ok(())
}

async fn expand(
    input: PathBuf,
    output: Option<PathBuf>,
    limit: Option<usize>,
    config: Option<PathBuf>,
    api: ApiArgs,
) -> Result<()> {
    let mut config = load_config(config.as_deref(), api.model.clone())?;
    if limit.is_some() {
        config.limit = limit;
    }
    let collection = CropCollection::load(&input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    let output = output.unwrap_or_else(|| default_output(&input, "expandido_ia"));

    let completer = Completer::new(api.client()?, ReferenceSchema::default(), config);
    let summary = completer
        .expand(&collection, &output, &cancel_on_ctrl_c())
        .await?;
    print_summary(&summary, "expanded");
    Ok(())
}

fn print_summary(summary: &RunSummary, done: &str) {
    let ctx = &summary.context;
    println!(
        "{} of {} crops processed: {} {}, {} unchanged, {} failed",
        ctx.processed,
        summary.total,
        ctx.completed,
        done,
        ctx.unchanged,
        ctx.failed()
    );
    println!(
        "Tokens: {} in / {} out, cost ${:.2}",
        ctx.usage.input_tokens, ctx.usage.output_tokens, ctx.cost_usd
    );
    if summary.interrupted {
        println!("Interrupted, partial result saved to {}", summary.output_path.display());
    } else {
        println!("Saved to {}", summary.output_path.display());
    }
}

fn load_seeds(path: &Path) -> Result<Vec<(String, CropSeed)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let Value::Object(entries) = serde_json::from_str::<Value>(&text)? else {
        anyhow::bail!("{} must map crop names to seeds", path.display());
    };
    entries
        .into_iter()
        .map(|(name, seed)| {
            let seed: CropSeed = serde_json::from_value(seed)
                .with_context(|| format!("invalid seed for {}", name))?;
            Ok((name, seed))
        })
        .collect()
}

async fn add(
    seeds: PathBuf,
    data_dir: PathBuf,
    reference: Option<PathBuf>,
    config: Option<PathBuf>,
    api: ApiArgs,
) -> Result<()> {
    let config = load_config(config.as_deref(), api.model.clone())?;
    let schema = load_schema(reference.as_deref())?;
    let seeds = load_seeds(&seeds)?;

    let completer = Completer::new(api.client()?, schema, config);
    let targets = AddTargets::in_dir(&data_dir);
    let summary = completer
        .add_crops(&seeds, &targets, &cancel_on_ctrl_c())
        .await?;

    println!("{} of {} crops added", summary.added.len(), seeds.len());
    if !summary.failed.is_empty() {
        println!("Failed: {}", summary.failed.join(", "));
    }
    println!("Cost ${:.2}", summary.cost_usd);
    if summary.interrupted {
        println!("Interrupted before all seeds were processed");
    }
    Ok(())
}
