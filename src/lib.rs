//! # Crop Profile Builder
//!
//! Finds the gaps in structured crop profiles, asks a text-generation model
//! for the missing sections only, and merges the answers back without
//! overwriting data that is already there.
//!
//! ## Core Concepts
//!
//! - **Crop document**: a JSON tree of named sections, keyed by crop name in a
//!   collection's `cultivos` mapping
//! - **Reference schema**: the sections a complete profile carries and the
//!   sub-keys each one must hold
//! - **Gap report**: which sections are absent, empty or incomplete, with a
//!   human-readable detail per section
//! - **Deep merge**: patches only fill what is missing; record lists are
//!   unioned by natural key (`nombre`, then `labor`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use crop_profile_builder::*;
//! use tokio_util::sync::CancellationToken;
//!
//! let collection = CropCollection::load(Path::new("cultivos.json"))?;
//! let completer = Completer::new(
//!     AnthropicClient::from_env()?,
//!     ReferenceSchema::default(),
//!     CompleterConfig::default(),
//! );
//! let summary = completer
//!     .run(&collection, Path::new("cultivos_completado.json"), &CancellationToken::new())
//!     .await?;
//! println!("{} crops completed", summary.context.completed);
//! ```

pub mod collection;
pub mod completer;
pub mod diagnose;
pub mod error;
pub mod export;
pub mod gaps;
pub mod llm;
pub mod merge;
pub mod schema;
pub mod utils;

pub use collection::{read_json, write_json, CropCollection};
pub use completer::{
    snapshot_path, AddSummary, AddTargets, Completer, CompleterConfig, CropOutcome, RunContext,
    RunSummary, TextGenerator,
};
pub use diagnose::{diagnose, diagnose_file, StructureDiagnosis};
pub use error::{CropProfileError, Result};
pub use export::{basic_entry, evaluate_risk, export_versions, medium_entry, ExportSummary};
pub use gaps::{analyze, GapDetail, GapReport};
#[cfg(feature = "anthropic")]
pub use llm::AnthropicClient;
pub use llm::{
    parse_patch, CropSeed, Generation, GenerationRequest, Pricing, Usage, EXPANSION_SECTIONS,
};
pub use merge::{deep_merge, deep_merge_values, overlay};
pub use schema::{ReferenceSchema, SectionSpec};
pub use utils::*;

use serde_json::Value;

/// Analyzes `crop` and merges `patch` into it when the report shows gaps.
///
/// Returns the (possibly unchanged) document and the report computed on the
/// original.
pub fn fill_gaps(crop: &Value, patch: &Value, schema: &ReferenceSchema) -> (Value, GapReport) {
    let report = analyze(crop, schema);
    if report.is_complete() {
        return (crop.clone(), report);
    }
    (deep_merge_values(crop, patch), report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fill_gaps_merges_only_when_needed() {
        let schema = ReferenceSchema::from_pairs(&[("meta", &["version", "fecha"])]);

        let incomplete = json!({"meta": {"version": "2.0"}});
        let (merged, report) = fill_gaps(&incomplete, &json!({"meta": {"fecha": "2024"}}), &schema);
        assert_eq!(report.incomplete, vec!["meta"]);
        assert_eq!(merged, json!({"meta": {"version": "2.0", "fecha": "2024"}}));

        let complete = json!({"meta": {"version": "2.0", "fecha": "2024"}});
        let (same, report) = fill_gaps(&complete, &json!({"extra": 1}), &schema);
        assert!(report.is_complete());
        assert_eq!(same, complete);
    }
}
