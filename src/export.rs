//! Lightweight derivatives of a complete collection: a listing for
//! navigation, a statistics view, and one file per crop for on-demand loading.

use crate::collection::{write_json, CropCollection};
use crate::error::Result;
use crate::utils::{slugify, value_at};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

pub const BASIC_FILE: &str = "cultivos_basico.json";
pub const MEDIUM_FILE: &str = "cultivos_medio.json";
pub const INDIVIDUAL_DIR: &str = "cultivos_individuales";

/// Number of risk alerts kept in the statistics view.
const TOP_ALERTS: usize = 3;
/// Risk listed for exported crops that carry neither a risk nor an ROI.
const EXPORT_FALLBACK_RISK: &str = "Medio";

// Profiles come in two layouts: the flat one of fully generated crops and the
// nested one of crops added later. Each field is read from the first path
// that holds a non-null value.
const YIELD_PATHS: &[&[&str]] = &[
    &["estadisticas", "rendimiento_promedio_t_por_ha"],
    &["estadisticas", "produccion", "rendimiento_promedio_t_ha"],
];
const PRICE_PATHS: &[&[&str]] = &[
    &["estadisticas", "precio_medio_mxn_ton"],
    &["estadisticas", "economia", "precio_medio_rural_mxn_ton"],
];
const ROI_PATHS: &[&[&str]] = &[
    &["analisis_rentabilidad", "roi_pct"],
    &["costos_produccion_detallados", "analisis_rentabilidad", "roi_pct"],
];
const RISK_PATHS: &[&[&str]] = &[
    &["analisis_rentabilidad", "riesgo"],
    &["costos_produccion_detallados", "analisis_rentabilidad", "riesgo"],
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub basic: PathBuf,
    pub medium: PathBuf,
    pub individual_dir: PathBuf,
    pub crops: usize,
}

fn first_present<'a>(crop: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| value_at(crop, path))
        .find(|v| !v.is_null())
}

/// Risk level from return on investment (percent).
pub fn evaluate_risk(roi: f64) -> &'static str {
    if roi >= 30.0 {
        "Bajo"
    } else if roi >= 15.0 {
        "Medio"
    } else {
        "Alto"
    }
}

/// Listing entry for one crop.
///
/// The risk is the profile's own, else derived from its ROI, else
/// `fallback_risk`.
pub fn basic_entry(name: &str, crop: &Value, fallback_risk: &str) -> Value {
    let roi = first_present(crop, ROI_PATHS);
    let risk = match first_present(crop, RISK_PATHS) {
        Some(explicit) => explicit.clone(),
        None => {
            let level: &str = roi.and_then(Value::as_f64).map_or(fallback_risk, |r| evaluate_risk(r));
            Value::String(level.to_string())
        }
    };

    json!({
        "nombre": name,
        "categoria": crop.get("categoria").cloned().unwrap_or(Value::Null),
        "rendimiento": first_present(crop, YIELD_PATHS).cloned().unwrap_or(Value::Null),
        "precio_medio": first_present(crop, PRICE_PATHS).cloned().unwrap_or(Value::Null),
        "roi": roi.cloned().unwrap_or(Value::Null),
        "riesgo": risk,
    })
}

/// Statistics-view entry for one crop.
pub fn medium_entry(crop: &Value) -> Value {
    let field = |key: &str| crop.get(key).cloned().unwrap_or(Value::Null);
    let alerts = match crop.get("alertas_riesgos") {
        Some(Value::Array(items)) => Value::Array(items.iter().take(TOP_ALERTS).cloned().collect()),
        _ => Value::Array(Vec::new()),
    };

    json!({
        "estadisticas": field("estadisticas"),
        "economia": field("economia_expandida"),
        "rentabilidad": field("analisis_rentabilidad"),
        "alertas": alerts,
    })
}

/// Writes the basic listing, the statistics view and the per-crop files under `dir`.
pub fn export_versions(collection: &CropCollection, dir: &Path) -> Result<ExportSummary> {
    let mut basic_meta = Map::new();
    basic_meta.insert("version".to_string(), json!("basico"));
    basic_meta.insert("tipo".to_string(), json!("listado"));

    let mut basic = CropCollection::new();
    *basic.meta_mut() = basic_meta;
    let mut medium = CropCollection::new();
    *medium.meta_mut() = collection.meta().clone();

    for (name, crop) in collection.crops() {
        basic.upsert_crop(name.clone(), basic_entry(name, crop, EXPORT_FALLBACK_RISK));
        medium.upsert_crop(name.clone(), medium_entry(crop));
    }

    let basic_path = dir.join(BASIC_FILE);
    basic.save_compact(&basic_path)?;
    info!("Wrote {}", basic_path.display());

    let medium_path = dir.join(MEDIUM_FILE);
    medium.save_compact(&medium_path)?;
    info!("Wrote {}", medium_path.display());

    let individual_dir = dir.join(INDIVIDUAL_DIR);
    for (name, crop) in collection.crops() {
        write_json(&individual_dir.join(format!("{}.json", slugify(name))), crop, true)?;
    }
    info!("Wrote {} files to {}", collection.len(), individual_dir.display());

    Ok(ExportSummary {
        basic: basic_path,
        medium: medium_path,
        individual_dir,
        crops: collection.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_thresholds() {
        assert_eq!(evaluate_risk(30.0), "Bajo");
        assert_eq!(evaluate_risk(29.9), "Medio");
        assert_eq!(evaluate_risk(15.0), "Medio");
        assert_eq!(evaluate_risk(-4.0), "Alto");
    }

    #[test]
    fn test_basic_entry_flat_layout() {
        let crop = json!({
            "categoria": "Granos",
            "estadisticas": {"rendimiento_promedio_t_por_ha": 3.8, "precio_medio_mxn_ton": 5200},
            "analisis_rentabilidad": {"roi_pct": 42, "riesgo": "Bajo-Medio"}
        });
        let entry = basic_entry("Maíz", &crop, EXPORT_FALLBACK_RISK);
        assert_eq!(entry["nombre"], "Maíz");
        assert_eq!(entry["rendimiento"], 3.8);
        assert_eq!(entry["precio_medio"], 5200);
        assert_eq!(entry["riesgo"], "Bajo-Medio");
    }

    #[test]
    fn test_basic_entry_nested_layout_derives_risk() {
        let crop = json!({
            "categoria": "Hongos",
            "estadisticas": {
                "produccion": {"rendimiento_promedio_t_ha": 12},
                "economia": {"precio_medio_rural_mxn_ton": 45000}
            },
            "costos_produccion_detallados": {"analisis_rentabilidad": {"roi_pct": 18.5}}
        });
        let entry = basic_entry("Setas", &crop, EXPORT_FALLBACK_RISK);
        assert_eq!(entry["rendimiento"], 12);
        assert_eq!(entry["precio_medio"], 45000);
        assert_eq!(entry["roi"], 18.5);
        assert_eq!(entry["riesgo"], "Medio");
    }

    #[test]
    fn test_basic_entry_without_roi_uses_fallback_risk() {
        let entry = basic_entry("Nopal", &json!({}), EXPORT_FALLBACK_RISK);
        assert_eq!(entry["riesgo"], "Medio");
        assert!(entry["roi"].is_null());
        assert!(entry["categoria"].is_null());

        let entry = basic_entry("Nopal", &json!({}), "Alto");
        assert_eq!(entry["riesgo"], "Alto");

        let with_roi = json!({"analisis_rentabilidad": {"roi_pct": 35}});
        assert_eq!(basic_entry("Nopal", &with_roi, "Alto")["riesgo"], "Bajo");
    }

    #[test]
    fn test_medium_entry_keeps_top_alerts() {
        let crop = json!({"alertas_riesgos": [1, 2, 3, 4, 5], "economia_expandida": {"a": 1}});
        let entry = medium_entry(&crop);
        assert_eq!(entry["alertas"], json!([1, 2, 3]));
        assert_eq!(entry["economia"]["a"], 1);
        assert!(entry["estadisticas"].is_null());
    }

    #[test]
    fn test_export_versions_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let collection = CropCollection::from_value(json!({
            "meta": {"version": "3.0"},
            "cultivos": {"Chile Habanero": {"categoria": "Hortalizas"}, "Maíz": {}}
        }))
        .unwrap();

        let summary = export_versions(&collection, dir.path()).unwrap();
        assert_eq!(summary.crops, 2);

        let basic = CropCollection::load(&summary.basic).unwrap();
        assert_eq!(basic.meta()["tipo"], "listado");
        assert_eq!(basic.get("Chile Habanero").unwrap()["categoria"], "Hortalizas");

        let medium = CropCollection::load(&summary.medium).unwrap();
        assert_eq!(medium.meta()["version"], "3.0");

        assert!(summary.individual_dir.join("chile_habanero.json").exists());
        assert!(summary.individual_dir.join("maíz.json").exists());
    }
}
