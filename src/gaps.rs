//! Gap analysis: which reference sections a crop profile is missing.

use crate::schema::ReferenceSchema;
use crate::utils::{is_falsy, is_truthy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DETAIL_ABSENT: &str = "Sección completa ausente";
pub const DETAIL_EMPTY: &str = "Sección vacía";

/// Supplementary detail key listing main pests without a control program.
pub const PESTS_WITHOUT_CONTROL: &str = "plagas_sin_control_detallado";
/// Supplementary detail key noting too few regional calendars.
pub const CALENDAR_SHORTFALL: &str = "calendarios_insuficientes";

const PESTS_SECTION: &str = "plagas_y_enfermedades";
const PHENOLOGY_SECTION: &str = "ciclo_fenologico";
const MIN_REGIONAL_CALENDARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GapDetail {
    Text(String),
    Names(Vec<String>),
}

impl GapDetail {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            GapDetail::Text(s) => Some(s),
            GapDetail::Names(_) => None,
        }
    }
}

impl std::fmt::Display for GapDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapDetail::Text(s) => f.write_str(s),
            GapDetail::Names(names) => f.write_str(&names.join(", ")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    /// Sections not present at all, in schema order.
    pub absent: Vec<String>,
    /// Sections present but falsy (`{}`, `[]`, `""`, `null`, ...).
    pub empty: Vec<String>,
    /// Mapping sections missing one or more required sub-keys.
    pub incomplete: Vec<String>,
    pub details: BTreeMap<String, GapDetail>,
}

impl GapReport {
    pub fn missing_count(&self) -> usize {
        self.absent.len() + self.empty.len() + self.incomplete.len()
    }

    /// True when no schema section needs generating. Supplementary details on
    /// their own do not count.
    pub fn is_complete(&self) -> bool {
        self.missing_count() == 0
    }

    /// Every section to regenerate: absent, then empty, then incomplete.
    pub fn sections_to_fill(&self) -> impl Iterator<Item = &str> {
        self.absent
            .iter()
            .chain(&self.empty)
            .chain(&self.incomplete)
            .map(String::as_str)
    }

    pub fn detail(&self, key: &str) -> Option<&GapDetail> {
        self.details.get(key)
    }

    pub fn pests_without_control(&self) -> &[String] {
        match self.details.get(PESTS_WITHOUT_CONTROL) {
            Some(GapDetail::Names(names)) => names,
            _ => &[],
        }
    }
}

/// Classifies every reference section of `document` as absent, empty or
/// incomplete. Never fails: nodes of an unexpected type just skip the check
/// that needed them.
pub fn analyze(document: &Value, schema: &ReferenceSchema) -> GapReport {
    let mut report = GapReport::default();
    let root = document.as_object();

    for section in schema.sections() {
        let name = &section.name;
        let Some(value) = root.and_then(|m| m.get(name)) else {
            report.absent.push(name.clone());
            report
                .details
                .insert(name.clone(), GapDetail::Text(DETAIL_ABSENT.to_string()));
            continue;
        };

        if is_falsy(value) {
            report.empty.push(name.clone());
            report
                .details
                .insert(name.clone(), GapDetail::Text(DETAIL_EMPTY.to_string()));
            continue;
        }

        // Sub-keys are only checked on mapping sections; list-valued sections
        // pass as long as they are non-empty.
        if section.subkeys.is_empty() {
            continue;
        }
        let Value::Object(fields) = value else {
            continue;
        };

        let missing: Vec<&str> = section
            .subkeys
            .iter()
            .filter(|key| fields.get(key.as_str()).map_or(true, is_falsy))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            report.incomplete.push(name.clone());
            report.details.insert(
                name.clone(),
                GapDetail::Text(format!("Faltan: {}", missing.join(", "))),
            );
        }
    }

    if let Some(names) = root.and_then(|m| m.get(PESTS_SECTION)).and_then(pests_without_control) {
        report
            .details
            .insert(PESTS_WITHOUT_CONTROL.to_string(), GapDetail::Names(names));
    }

    if let Some(shortfall) = root
        .and_then(|m| m.get(PHENOLOGY_SECTION))
        .and_then(calendar_shortfall)
    {
        report
            .details
            .insert(CALENDAR_SHORTFALL.to_string(), GapDetail::Text(shortfall));
    }

    report
}

fn pests_without_control(section: &Value) -> Option<Vec<String>> {
    let Some(Value::Array(main)) = section.as_object()?.get("principales") else {
        return None;
    };

    let names: Vec<String> = main
        .iter()
        .enumerate()
        .filter(|(_, pest)| pest.is_object())
        .filter(|(_, pest)| !pest.get("control").is_some_and(is_truthy))
        .map(|(i, pest)| pest_label(pest).unwrap_or_else(|| format!("Plaga {}", i + 1)))
        .collect();

    (!names.is_empty()).then_some(names)
}

/// A pest is reported by its `nombre` only; `labor` names a task, not a pest.
fn pest_label(pest: &Value) -> Option<String> {
    match pest.get("nombre")? {
        Value::Null => None,
        Value::String(name) => Some(name.clone()),
        other => Some(other.to_string()),
    }
}

fn calendar_shortfall(section: &Value) -> Option<String> {
    let cycle = section.as_object()?;
    let count = match cycle.get("calendarios_regionales") {
        None => 0,
        Some(Value::Array(calendars)) => calendars.len(),
        Some(_) => return None,
    };

    (count < MIN_REGIONAL_CALENDARS).then(|| format!("Solo {} de 3-5 recomendados", count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta_schema() -> ReferenceSchema {
        ReferenceSchema::from_pairs(&[("meta", &["version", "fecha"])])
    }

    #[test]
    fn test_missing_subkey_makes_section_incomplete() {
        let report = analyze(&json!({"meta": {"version": "2.0"}}), &meta_schema());
        assert_eq!(report.incomplete, vec!["meta"]);
        assert!(report.absent.is_empty());
        assert!(report.empty.is_empty());
        assert!(report.details["meta"].to_string().contains("fecha"));
    }

    #[test]
    fn test_empty_mapping_is_empty_not_incomplete() {
        let report = analyze(&json!({"meta": {}}), &meta_schema());
        assert_eq!(report.empty, vec!["meta"]);
        assert!(report.incomplete.is_empty());
        assert_eq!(report.details["meta"].as_text(), Some(DETAIL_EMPTY));
    }

    #[test]
    fn test_absent_section() {
        let report = analyze(&json!({"otro": 1}), &meta_schema());
        assert_eq!(report.absent, vec!["meta"]);
        assert_eq!(report.details["meta"].as_text(), Some(DETAIL_ABSENT));
    }

    #[test]
    fn test_falsy_subkey_counts_as_missing() {
        let report = analyze(
            &json!({"meta": {"version": "", "fecha": "2024-12-15"}}),
            &meta_schema(),
        );
        assert_eq!(
            report.details["meta"],
            GapDetail::Text("Faltan: version".to_string())
        );
    }

    #[test]
    fn test_falsy_scalars_are_empty_sections() {
        let schema = ReferenceSchema::from_pairs(&[("a", &[]), ("b", &[]), ("c", &[]), ("d", &[])]);
        let report = analyze(&json!({"a": 0, "b": false, "c": null, "d": ""}), &schema);
        assert_eq!(report.empty, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_list_section_skips_subkey_checks() {
        // Known quirk: a list where a mapping with sub-keys is expected passes.
        let schema = ReferenceSchema::from_pairs(&[("alertas_riesgos", &["climaticas"])]);
        let report = analyze(&json!({"alertas_riesgos": [{"tipo": "Helada"}]}), &schema);
        assert!(report.is_complete());
        assert!(report.details.is_empty());
    }

    #[test]
    fn test_non_object_document_reports_everything_absent() {
        let schema = ReferenceSchema::default();
        let report = analyze(&json!(["not", "a", "crop"]), &schema);
        assert_eq!(report.absent.len(), schema.len());
        assert_eq!(report.details.len(), schema.len());
    }

    #[test]
    fn test_pests_without_control_are_named() {
        let doc = json!({
            "plagas_y_enfermedades": {
                "principales": [
                    {"nombre": "Pulgón", "control": {"quimico": []}},
                    {"nombre": "Mosca blanca"},
                    {"control": null},
                    "texto suelto",
                    {"nombre": "Roya", "control": {"cultural": ["Poda"]}}
                ]
            }
        });
        let report = analyze(&doc, &ReferenceSchema::default());
        assert_eq!(
            report.pests_without_control(),
            &["Mosca blanca".to_string(), "Plaga 3".to_string()]
        );
    }

    #[test]
    fn test_pest_label_ignores_labor() {
        let doc = json!({
            "plagas_y_enfermedades": {
                "principales": [
                    {"labor": "Monitoreo"},
                    {"nombre": null, "labor": "Trampeo"},
                    {"nombre": 7}
                ]
            }
        });
        let report = analyze(&doc, &ReferenceSchema::default());
        assert_eq!(
            report.pests_without_control(),
            &["Plaga 1".to_string(), "Plaga 2".to_string(), "7".to_string()]
        );
    }

    #[test]
    fn test_calendar_shortfall() {
        let doc = json!({"ciclo_fenologico": {"calendarios_regionales": [{"region": "Sonora"}]}});
        let report = analyze(&doc, &ReferenceSchema::default());
        assert_eq!(
            report.details[CALENDAR_SHORTFALL].as_text(),
            Some("Solo 1 de 3-5 recomendados")
        );

        let doc = json!({"ciclo_fenologico": {"calendarios_regionales": [1, 2, 3]}});
        let report = analyze(&doc, &ReferenceSchema::default());
        assert!(report.detail(CALENDAR_SHORTFALL).is_none());

        let doc = json!({"ciclo_fenologico": [1, 2]});
        let report = analyze(&doc, &ReferenceSchema::default());
        assert!(report.detail(CALENDAR_SHORTFALL).is_none());
    }

    #[test]
    fn test_sets_are_disjoint_and_detailed() {
        let doc = json!({
            "meta": {"version": "1"},
            "estadisticas": {},
            "ciclo_fenologico": [],
            "riego": {"requerimiento_hidrico": {"lamina": 500}, "sistemas_riego": [{"sistema": "Goteo"}]},
            "plagas_y_enfermedades": "sin datos",
            "buenas_practicas_destacadas": [{"practica": "Poda"}]
        });
        let report = analyze(&doc, &ReferenceSchema::default());

        let all: Vec<&str> = report.sections_to_fill().collect();
        let mut dedup = all.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(all.len(), dedup.len());
        for name in &all {
            assert!(report.details.contains_key(*name), "missing detail for {}", name);
        }
        assert_eq!(report.incomplete, vec!["meta"]);
        assert_eq!(report.empty, vec!["estadisticas", "ciclo_fenologico"]);
        assert!(!all.contains(&"riego"));
        assert!(!all.contains(&"plagas_y_enfermedades"));
    }
}
