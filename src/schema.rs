use crate::collection::read_json;
use crate::error::{CropProfileError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Sections every complete crop profile is expected to carry, with the
/// sub-keys that must be present and non-empty inside each mapping section.
const DEFAULT_SECTIONS: &[(&str, &[&str])] = &[
    ("meta", &["version", "fecha_actualizacion", "fuente_datos"]),
    ("estadisticas", &["produccion", "economia", "principales_estados"]),
    (
        "ciclo_fenologico",
        &["etapas", "calendarios_regionales", "densidad_plantacion"],
    ),
    ("labores_culturales", &["resumen_costos_anuales"]),
    (
        "requerimientos_agroclimaticos",
        &["temperatura", "suelo", "precipitacion"],
    ),
    ("plagas_y_enfermedades", &["principales"]),
    (
        "fertilizacion",
        &["requerimientos_anuales", "programas_fertilizacion"],
    ),
    ("riego", &["requerimiento_hidrico", "sistemas_riego"]),
    (
        "costos_produccion_detallados",
        &["establecimiento_primer_año", "operacion_anual_produccion"],
    ),
    ("mercado_comercializacion", &["canales_venta", "temporadas_precios"]),
    ("postcosecha", &["punto_cosecha", "vida_util_dias"]),
    ("alertas_riesgos", &["climaticas", "fitosanitarias", "economicas"]),
    ("recursos_asistencia", &["instituciones"]),
    ("buenas_practicas_destacadas", &[]),
    ("errores_comunes_evitar", &[]),
    ("conclusiones_recomendaciones", &[]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    /// Empty means the section only has to be non-empty.
    #[serde(default)]
    pub subkeys: Vec<String>,
}

/// Ordered section → expected sub-keys mapping used to judge completeness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSchema {
    sections: Vec<SectionSpec>,
}

impl ReferenceSchema {
    /// Convenience constructor from borrowed pairs, in declaration order.
    pub fn from_pairs(pairs: &[(&str, &[&str])]) -> Self {
        let sections = pairs
            .iter()
            .map(|(name, subkeys)| SectionSpec {
                name: name.to_string(),
                subkeys: subkeys.iter().map(|s| s.to_string()).collect(),
            })
            .collect();
        Self { sections }
    }

    /// Derives a schema from a complete reference profile.
    ///
    /// Every top-level key becomes a section. Mapping sections contribute
    /// their own keys as required sub-keys; lists and scalars only have to be
    /// non-empty. A non-mapping template yields `None`.
    pub fn from_template(template: &Value) -> Option<Self> {
        let root = template.as_object()?;
        let sections = root
            .iter()
            .map(|(name, value)| SectionSpec {
                name: name.clone(),
                subkeys: value
                    .as_object()
                    .map(|m| m.keys().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect();
        Some(Self { sections })
    }

    /// Loads a reference profile from disk.
    ///
    /// A missing file falls back to the built-in schema; a file that is not a
    /// JSON object is rejected.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let template = match read_json(path) {
            Ok(template) => template,
            Err(CropProfileError::InputNotFound(_)) => {
                warn!("Reference {} not found, using built-in schema", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };
        Self::from_template(&template).ok_or_else(|| {
            CropProfileError::InvalidCollection(format!(
                "reference {} must be a JSON object",
                path.display()
            ))
        })
    }

    pub fn sections(&self) -> &[SectionSpec] {
        &self.sections
    }

    pub fn get(&self, name: &str) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl Default for ReferenceSchema {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_SECTIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_schema_order_and_shape() {
        let schema = ReferenceSchema::default();
        assert_eq!(schema.len(), 16);
        assert_eq!(schema.sections()[0].name, "meta");
        assert_eq!(
            schema.sections().last().unwrap().name,
            "conclusiones_recomendaciones"
        );
        assert!(schema.get("buenas_practicas_destacadas").unwrap().subkeys.is_empty());
        assert_eq!(
            schema.get("riego").unwrap().subkeys,
            vec!["requerimiento_hidrico", "sistemas_riego"]
        );
    }

    #[test]
    fn test_schema_from_template() {
        let template = json!({
            "meta": {"version": "2.0", "fuente_datos": "SIAP"},
            "buenas_practicas_destacadas": [{"practica": "Poda"}],
            "cultivo": "Durazno"
        });
        let schema = ReferenceSchema::from_template(&template).unwrap();
        let names: Vec<&str> = schema.sections().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["meta", "buenas_practicas_destacadas", "cultivo"]);
        assert_eq!(schema.get("meta").unwrap().subkeys, vec!["version", "fuente_datos"]);
        assert!(schema.get("cultivo").unwrap().subkeys.is_empty());

        assert!(ReferenceSchema::from_template(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_schema_deserializes_from_json() {
        let schema: ReferenceSchema = serde_json::from_value(json!({
            "sections": [{"name": "meta", "subkeys": ["version"]}, {"name": "riego"}]
        }))
        .unwrap();
        assert_eq!(schema.len(), 2);
        assert!(schema.get("riego").unwrap().subkeys.is_empty());
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ReferenceSchema::load_or_default(&dir.path().join("durazno.json")).unwrap();
        assert_eq!(missing, ReferenceSchema::default());

        let path = dir.path().join("referencia.json");
        std::fs::write(&path, r#"{"meta": {"version": "1"}, "riego": {}}"#).unwrap();
        let loaded = ReferenceSchema::load_or_default(&path).unwrap();
        assert_eq!(loaded.len(), 2);

        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(
            ReferenceSchema::load_or_default(&path),
            Err(CropProfileError::InvalidCollection(_))
        ));
    }
}
