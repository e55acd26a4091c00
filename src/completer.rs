//! Batch completion: analyze each crop, request the missing sections, merge
//! the generated patch back in, and persist the collection. The expansion
//! run shares the same loop but asks for a fixed set of detailed sections.

use crate::collection::{write_json, CropCollection};
use crate::error::{CropProfileError, Result};
use crate::export::{basic_entry, evaluate_risk};
use crate::gaps::analyze;
use crate::llm::prompts::{
    build_expand_prompt, build_gap_prompt, build_new_crop_prompt, CropSeed, EXPANSION_SECTIONS,
};
use crate::llm::types::{Generation, GenerationRequest, Pricing, Usage};
use crate::llm::utils::parse_patch;
use crate::merge::{deep_merge, overlay};
use crate::schema::ReferenceSchema;
use crate::utils::{kind_name, slugify};
use async_trait::async_trait;
use chrono::Local;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const GENERATOR_NAME: &str = "crop-profile-builder";
const EXPANSION_NOTE: &str = "Información generada automáticamente - requiere validación";
const CATEGORIES_KEY: &str = "categorias";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchMode {
    /// Fill only the gaps of existing profiles.
    Complete,
    /// Generate detailed sections for base records.
    Expand,
}

impl BatchMode {
    fn verb(self) -> &'static str {
        match self {
            BatchMode::Complete => "Completing",
            BatchMode::Expand => "Expanding",
        }
    }

    fn done(self) -> &'static str {
        match self {
            BatchMode::Complete => "completed",
            BatchMode::Expand => "expanded",
        }
    }
}

/// Anything that turns a prompt into text: the hosted API in production,
/// scripted responses in tests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompleterConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Total attempts per generation call, including the first one.
    pub max_retries: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub retry_base_delay_ms: u64,
    /// Write a `.tmp` snapshot after this many records. Zero disables snapshots.
    pub snapshot_interval: usize,
    /// Pause between records.
    pub pause_ms: u64,
    /// Only process the first N crops.
    pub limit: Option<usize>,
    pub pricing: Pricing,
}

impl Default for CompleterConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 6000,
            temperature: 0.2,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            snapshot_interval: 5,
            pause_ms: 2000,
            limit: None,
            pricing: Pricing::default(),
        }
    }
}

impl CompleterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let value = crate::collection::read_json(path)?;
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropOutcome {
    /// Missing sections were generated and merged.
    Completed,
    /// Nothing was missing.
    Unchanged,
    /// The record is not a mapping; kept as-is.
    NotAnObject,
    /// Every generation attempt failed; original kept.
    GenerationFailed,
    /// The response held no usable JSON object; original kept.
    ParseFailed,
}

/// Counters and spend accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub processed: usize,
    pub completed: usize,
    pub unchanged: usize,
    pub not_an_object: usize,
    pub generation_failed: usize,
    pub parse_failed: usize,
    pub usage: Usage,
    pub cost_usd: f64,
}

impl RunContext {
    pub fn record(&mut self, outcome: CropOutcome) {
        self.processed += 1;
        match outcome {
            CropOutcome::Completed => self.completed += 1,
            CropOutcome::Unchanged => self.unchanged += 1,
            CropOutcome::NotAnObject => self.not_an_object += 1,
            CropOutcome::GenerationFailed => self.generation_failed += 1,
            CropOutcome::ParseFailed => self.parse_failed += 1,
        }
    }

    pub fn charge(&mut self, usage: Usage, pricing: &Pricing) -> f64 {
        let cost = pricing.cost(usage);
        self.usage.add(usage);
        self.cost_usd += cost;
        cost
    }

    pub fn failed(&self) -> usize {
        self.not_an_object + self.generation_failed + self.parse_failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub context: RunContext,
    pub interrupted: bool,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddTargets {
    /// Full collection the new profiles are added to.
    pub complete: PathBuf,
    /// Lightweight listing.
    pub basic: PathBuf,
    /// Directory of one-file-per-crop profiles.
    pub individual_dir: PathBuf,
}

impl AddTargets {
    /// Default file layout under a data directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            complete: dir.join("cultivos_expandido_ia_completado.json"),
            basic: dir.join("cultivos_basico.json"),
            individual_dir: dir.join("cultivos_individuales"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddSummary {
    pub added: Vec<String>,
    pub failed: Vec<String>,
    pub usage: Usage,
    pub cost_usd: f64,
    pub interrupted: bool,
}

/// `<output>.tmp`, next to the output file.
pub fn snapshot_path(output: &Path) -> PathBuf {
    let mut name: OsString = output.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

pub struct Completer<G> {
    generator: G,
    schema: ReferenceSchema,
    config: CompleterConfig,
}

impl<G: TextGenerator> Completer<G> {
    pub fn new(generator: G, schema: ReferenceSchema, config: CompleterConfig) -> Self {
        Self {
            generator,
            schema,
            config,
        }
    }

    /// Calls the generator, retrying with exponential backoff.
    ///
    /// Cancellation wins over both the in-flight call and the backoff sleep.
    pub async fn generate_with_retry(
        &self,
        prompt: String,
        cancel: &CancellationToken,
    ) -> Result<Generation> {
        let request = GenerationRequest {
            model: self.config.model.clone(),
            prompt,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CropProfileError::Interrupted),
                result = self.generator.generate(&request) => result,
            };

            match result {
                Ok(generation) => return Ok(generation),
                Err(e) => {
                    warn!("Generation attempt {} of {} failed: {}", attempt + 1, attempts, e);
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < attempts {
                let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
                let delay = self.config.retry_base_delay_ms.saturating_mul(factor);
                pause(Duration::from_millis(delay), cancel).await?;
            }
        }

        Err(CropProfileError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    /// Fills the gaps of one crop.
    ///
    /// Every recoverable failure keeps the original record; the only error
    /// returned is [`CropProfileError::Interrupted`].
    pub async fn complete_crop(
        &self,
        name: &str,
        crop: &Value,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<(Value, CropOutcome)> {
        let attempt = self.try_complete_crop(name, crop, ctx, cancel).await;
        recover(name, crop, attempt, ctx)
    }

    async fn try_complete_crop(
        &self,
        name: &str,
        crop: &Value,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<(Value, CropOutcome)> {
        let Value::Object(fields) = crop else {
            warn!("{}: profile is a {}, not a mapping; kept as-is", name, kind_name(crop));
            return Ok((crop.clone(), CropOutcome::NotAnObject));
        };

        let report = analyze(crop, &self.schema);
        let Some(prompt) = build_gap_prompt(name, crop, &report) else {
            info!("{}: complete, no changes", name);
            return Ok((crop.clone(), CropOutcome::Unchanged));
        };

        info!("{}: {} sections to complete", name, report.missing_count());
        for section in &report.absent {
            debug!("  {}: absent", section);
        }
        for section in &report.empty {
            debug!("  {}: empty", section);
        }
        for section in &report.incomplete {
            if let Some(detail) = report.detail(section) {
                debug!("  {}: {}", section, detail);
            }
        }

        let generation = self.generate_with_retry(prompt, cancel).await?;
        let cost = ctx.charge(generation.usage, &self.config.pricing);
        info!("{}: generated ({} output tokens, ${:.4})", name, generation.usage.output_tokens, cost);

        let patch = parse_patch(&generation.text)?;
        let merged = deep_merge(fields, &patch);
        Ok((Value::Object(merged), CropOutcome::Completed))
    }

    /// Generates the detailed sections of one base crop and lays them over it.
    ///
    /// Generated top-level sections replace the base ones wholesale and a
    /// `meta_ia` stamp records model, date and cost. Failures keep the base
    /// record, as in [`Completer::complete_crop`].
    pub async fn expand_crop(
        &self,
        name: &str,
        crop: &Value,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<(Value, CropOutcome)> {
        let attempt = self.try_expand_crop(name, crop, ctx, cancel).await;
        recover(name, crop, attempt, ctx)
    }

    async fn try_expand_crop(
        &self,
        name: &str,
        crop: &Value,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<(Value, CropOutcome)> {
        let Value::Object(base) = crop else {
            warn!("{}: profile is a {}, not a mapping; kept as-is", name, kind_name(crop));
            return Ok((crop.clone(), CropOutcome::NotAnObject));
        };

        let generation = self
            .generate_with_retry(build_expand_prompt(name, crop), cancel)
            .await?;
        let cost = ctx.charge(generation.usage, &self.config.pricing);
        info!("{}: generated ({} output tokens, ${:.4})", name, generation.usage.output_tokens, cost);

        let sections = parse_patch(&generation.text)?;
        let known = EXPANSION_SECTIONS
            .iter()
            .filter(|section| sections.contains_key(**section))
            .count();
        debug!("{}: {}/{} detailed sections", name, known, EXPANSION_SECTIONS.len());
        let mut expanded = overlay(base, sections);
        expanded.insert(
            "meta_ia".to_string(),
            json!({
                "generado_por": GENERATOR_NAME,
                "fecha": Local::now().to_rfc3339(),
                "version_modelo": self.config.model,
                "costo_usd": (cost * 10_000.0).round() / 10_000.0,
                "requiere_validacion": true,
            }),
        );
        Ok((Value::Object(expanded), CropOutcome::Completed))
    }

    /// Completes every crop of `input` and writes the result to `output`.
    ///
    /// A snapshot of the in-progress result goes to `<output>.tmp` every
    /// `snapshot_interval` records. On cancellation the partial result is
    /// written to `output` and the summary is flagged as interrupted.
    pub async fn run(
        &self,
        input: &CropCollection,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let mut result = input.empty_like();
        let meta = result.meta_mut();
        meta.insert(
            "ultima_actualizacion".to_string(),
            Value::String(Local::now().to_rfc3339()),
        );
        meta.insert(
            "completado_con".to_string(),
            Value::String(format!("{} v{}", GENERATOR_NAME, env!("CARGO_PKG_VERSION"))),
        );
        self.run_batch(BatchMode::Complete, input, result, output, cancel)
            .await
    }

    /// Expands every base crop of `input` into a detailed profile and writes
    /// the result to `output`, with the same snapshot and interruption
    /// behavior as [`Completer::run`].
    pub async fn expand(
        &self,
        input: &CropCollection,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let mut result = input.empty_like();
        let meta = result.meta_mut();
        meta.insert("version".to_string(), json!("2.0-ia"));
        meta.insert(
            "generado_con".to_string(),
            Value::String(format!("{} v{}", GENERATOR_NAME, env!("CARGO_PKG_VERSION"))),
        );
        meta.insert("fecha_generacion".to_string(), json!(Local::now().to_rfc3339()));
        meta.insert("nota".to_string(), json!(EXPANSION_NOTE));
        result
            .extra_mut()
            .entry(CATEGORIES_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        self.run_batch(BatchMode::Expand, input, result, output, cancel)
            .await
    }

    async fn run_batch(
        &self,
        mode: BatchMode,
        input: &CropCollection,
        mut result: CropCollection,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let total = self
            .config
            .limit
            .map_or(input.len(), |limit| limit.min(input.len()));
        info!("{} {} crops into {}", mode.verb(), total, output.display());

        let mut ctx = RunContext::default();
        let tmp_path = snapshot_path(output);

        for (i, (name, crop)) in input.crops().iter().take(total).enumerate() {
            let position = i + 1;
            info!("[{}/{}] {}", position, total, name);

            if cancel.is_cancelled() {
                return self.save_interrupted(&result, output, total, ctx);
            }

            let processed = match mode {
                BatchMode::Complete => self.complete_crop(name, crop, &mut ctx, cancel).await,
                BatchMode::Expand => self.expand_crop(name, crop, &mut ctx, cancel).await,
            };
            let value = match processed {
                Ok((value, _)) => value,
                Err(CropProfileError::Interrupted) => {
                    return self.save_interrupted(&result, output, total, ctx)
                }
                Err(e) => return Err(e),
            };
            result.upsert_crop(name.clone(), value);

            if self.config.snapshot_interval > 0 && position % self.config.snapshot_interval == 0 {
                match result.save(&tmp_path) {
                    Ok(()) => debug!("Progress saved to {}", tmp_path.display()),
                    Err(e) => warn!("Could not save progress to {}: {}", tmp_path.display(), e),
                }
            }

            if position < total
                && pause(Duration::from_millis(self.config.pause_ms), cancel)
                    .await
                    .is_err()
            {
                return self.save_interrupted(&result, output, total, ctx);
            }
        }

        result.save(output)?;
        info!(
            "Done: {}/{} {}, {} unchanged, {} failed, ${:.2} total",
            ctx.completed,
            total,
            mode.done(),
            ctx.unchanged,
            ctx.failed(),
            ctx.cost_usd
        );

        Ok(RunSummary {
            total,
            context: ctx,
            interrupted: false,
            output_path: output.to_path_buf(),
        })
    }

    fn save_interrupted(
        &self,
        result: &CropCollection,
        output: &Path,
        total: usize,
        ctx: RunContext,
    ) -> Result<RunSummary> {
        warn!("Interrupted, saving {} processed crops to {}", result.len(), output.display());
        result.save(output)?;
        Ok(RunSummary {
            total,
            context: ctx,
            interrupted: true,
            output_path: output.to_path_buf(),
        })
    }

    /// Generates full profiles for crops that are not in the collection yet
    /// and adds them to the complete collection, the basic listing and the
    /// individual profile directory.
    pub async fn add_crops(
        &self,
        seeds: &[(String, CropSeed)],
        targets: &AddTargets,
        cancel: &CancellationToken,
    ) -> Result<AddSummary> {
        let mut summary = AddSummary::default();
        let mut ctx = RunContext::default();

        for (i, (name, seed)) in seeds.iter().enumerate() {
            info!(
                "[{}/{}] Generating {} ({}, {})",
                i + 1,
                seeds.len(),
                name,
                seed.nombre_cientifico,
                seed.categoria
            );

            let prompt = build_new_crop_prompt(name, seed, &self.schema);
            let generation = match self.generate_with_retry(prompt, cancel).await {
                Ok(generation) => generation,
                Err(CropProfileError::Interrupted) => {
                    summary.interrupted = true;
                    break;
                }
                Err(e) => {
                    warn!("{}: generation failed: {}", name, e);
                    summary.failed.push(name.clone());
                    continue;
                }
            };
            ctx.charge(generation.usage, &self.config.pricing);

            let mut profile = match parse_patch(&generation.text) {
                Ok(profile) => profile,
                Err(e) => {
                    warn!("{}: {}", name, e);
                    summary.failed.push(name.clone());
                    continue;
                }
            };
            profile.insert("cultivo".to_string(), Value::String(name.clone()));
            let profile = Value::Object(profile);

            match store_new_crop(name, &profile, targets) {
                Ok(()) => {
                    info!("{}: added to all files", name);
                    summary.added.push(name.clone());
                }
                Err(e) => {
                    warn!("{}: could not be saved: {}", name, e);
                    summary.failed.push(name.clone());
                }
            }

            if i + 1 < seeds.len()
                && pause(Duration::from_millis(self.config.pause_ms), cancel)
                    .await
                    .is_err()
            {
                summary.interrupted = true;
                break;
            }
        }

        summary.usage = ctx.usage;
        summary.cost_usd = ctx.cost_usd;
        Ok(summary)
    }
}

fn store_new_crop(name: &str, profile: &Value, targets: &AddTargets) -> Result<()> {
    let now = Local::now();

    let mut complete = CropCollection::load_or_default(&targets.complete)?;
    complete.upsert_crop(name, profile.clone());
    complete.stamp_updated(now);
    complete.save(&targets.complete)?;

    let mut basic = CropCollection::load_or_default(&targets.basic)?;
    // A generated profile without an ROI is listed as if its ROI were zero.
    basic.upsert_crop(name, basic_entry(name, profile, evaluate_risk(0.0)));
    basic.stamp_updated(now);
    basic.save(&targets.basic)?;

    let individual = targets
        .individual_dir
        .join(format!("{}.json", slugify(name)));
    write_json(&individual, profile, true)
}

/// Keeps the original record on any failure except interruption, and
/// records the outcome.
fn recover(
    name: &str,
    crop: &Value,
    attempt: Result<(Value, CropOutcome)>,
    ctx: &mut RunContext,
) -> Result<(Value, CropOutcome)> {
    let (value, outcome) = match attempt {
        Ok(done) => done,
        Err(CropProfileError::Interrupted) => return Err(CropProfileError::Interrupted),
        Err(e @ CropProfileError::ResponseParse(_)) => {
            warn!("{}: could not parse generated data: {}", name, e);
            (crop.clone(), CropOutcome::ParseFailed)
        }
        Err(e) => {
            warn!("{}: generation failed: {}", name, e);
            (crop.clone(), CropOutcome::GenerationFailed)
        }
    };
    ctx.record(outcome);
    Ok((value, outcome))
}

/// Sleeps unless cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    if duration.is_zero() {
        return if cancel.is_cancelled() {
            Err(CropProfileError::Interrupted)
        } else {
            Ok(())
        };
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CropProfileError::Interrupted),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
