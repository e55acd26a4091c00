//! Generation requests for gap filling, base-record expansion and brand-new
//! crop profiles.

use crate::gaps::{GapReport, PESTS_WITHOUT_CONTROL};
use crate::schema::ReferenceSchema;
use crate::utils::value_at;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SECTION_TEMPLATES: &[(&str, &str)] = &[
    (
        "meta",
        r#"  "meta": {
    "version": "2.0",
    "fecha_actualizacion": "2024-12-15",
    "fuente_datos": "SIAP-SAGARPA, INIFAP",
    "nivel_confianza": "Alto"
  }"#,
    ),
    (
        "estadisticas",
        r#"  "estadisticas": {
    "produccion": {
      "produccion_nacional_ton": [número],
      "superficie_sembrada_ha": [número],
      "superficie_cosechada_ha": [número],
      "rendimiento_promedio_t_ha": [número],
      "variacion_anual_pct": [número]
    },
    "economia": {
      "precio_medio_rural_mxn_ton": [MXN],
      "precio_min_mxn_ton": [MXN],
      "precio_max_mxn_ton": [MXN],
      "valor_produccion_millones_mxn": [valor],
      "epoca_mejor_precio": "[meses]",
      "epoca_peor_precio": "[meses]"
    },
    "principales_estados": [
      {"estado": "[Estado]", "participacion_pct": [%], "rendimiento_t_ha": [número]}
    ]
  }"#,
    ),
    (
        "ciclo_fenologico",
        r#"  "ciclo_fenologico": {
    "duracion_total_dias": [número],
    "etapas": [
      {
        "nombre": "[Etapa]",
        "duracion_dias": [días],
        "bbch_fase": "[código]",
        "meses": "[meses]",
        "temperatura_optima": "[°C]",
        "descripcion": "[detalle]"
      }
    ],
    "calendarios_regionales": [
      {
        "region": "[Estado específico]",
        "altitud": "[msnm]",
        "siembra_inicio": "[mes]",
        "siembra_fin": "[mes]",
        "cosecha_inicio": "[mes]",
        "cosecha_fin": "[mes]",
        "rendimiento_esperado_t_ha": [número],
        "ventana_comercial": "[descripción]"
      }
    ],
    "densidad_plantacion": {
      "sistemas": [
        {
          "nombre": "[Tradicional/Tecnificado]",
          "plantas_ha": [número],
          "distancia_m": "[dist]",
          "costo_instalacion_ha": [MXN]
        }
      ]
    }
  }"#,
    ),
    (
        "labores_culturales",
        r#"  "labores_culturales": {
    "Preparacion": {
      "actividades": [{"labor": "[nombre]", "epoca": "[cuándo]", "costo_ha": [MXN]}]
    },
    "Siembra": {
      "actividades": [{"labor": "[labor]", "costo_ha": [MXN]}]
    },
    "Mantenimiento": {
      "actividades": [{"labor": "[labor]", "epoca": "[cuándo]", "costo_ha": [MXN]}]
    },
    "Cosecha": {
      "actividades": [
        {"labor": "Recolección", "rendimiento_jornalero": "[kg/día]", "costo_kg": [MXN]}
      ]
    },
    "resumen_costos_anuales": {
      "sistema_tradicional": {
        "preparacion": [MXN],
        "fertilizantes": [MXN],
        "control_plagas": [MXN],
        "riego": [MXN],
        "cosecha": [MXN],
        "total_operacion": [MXN],
        "costo_por_kg": [MXN]
      }
    }
  }"#,
    ),
    (
        "requerimientos_agroclimaticos",
        r#"  "requerimientos_agroclimaticos": {
    "temperatura": {
      "optima_crecimiento": "[rango °C]",
      "minima_absoluta": "[°C]",
      "maxima_tolerada": "[°C]",
      "critica_fase": "[fase sensible]"
    },
    "altitud": {"rango": "[rango msnm]", "optima": "[óptimo msnm]"},
    "precipitacion": {
      "anual_mm": "[rango]",
      "distribucion": "[patrón ideal]",
      "riego_suplementario": "[necesidad]"
    },
    "suelo": {
      "textura": "[texturas adecuadas]",
      "ph": {"rango": "[rango pH]", "optimo": "[pH]"},
      "profundidad_min_cm": [cm],
      "drenaje": "[requerimiento]"
    }
  }"#,
    ),
    (
        "plagas_y_enfermedades",
        r#"  "plagas_y_enfermedades": {
    "principales": [
      {
        "nombre": "[Nombre común]",
        "nombre_cientifico": "[Científico]",
        "tipo": "Plaga/Enfermedad",
        "descripcion": "[daño]",
        "sintomas": ["[síntoma 1]"],
        "umbral_economico": "[cuándo controlar]",
        "control": {
          "estrategia_mip": ["[práctica 1]"],
          "quimico": [
            {
              "ingrediente": "[I.A.]",
              "nombre_comercial": "[Marca México]",
              "dosis": "[dosis/ha]",
              "intervalo_seguridad_dias": [días],
              "costo_aplicacion_ha": [MXN]
            }
          ],
          "biologico": [{"organismo": "[nombre]", "dosis": "[cantidad]"}],
          "cultural": ["[práctica 1]"]
        },
        "epoca_mayor_incidencia": "[meses]",
        "perdidas_potenciales_pct": [%]
      }
    ]
  }"#,
    ),
    (
        "fertilizacion",
        r#"  "fertilizacion": {
    "requerimientos_anuales": {
      "N_kg_ha": [kg],
      "P2O5_kg_ha": [kg],
      "K2O_kg_ha": [kg],
      "micronutrientes": ["[elemento: cantidad]"]
    },
    "programas_fertilizacion": [
      {
        "nombre": "[Sistema temporal/riego]",
        "costo_anual": [MXN],
        "aplicaciones": [
          {
            "epoca": "[Etapa fenológica]",
            "producto": "[Fórmula NPK]",
            "dosis_kg_ha": [kg],
            "metodo": "[Método aplicación]",
            "costo": [MXN]
          }
        ]
      }
    ]
  }"#,
    ),
    (
        "riego",
        r#"  "riego": {
    "requerimiento_hidrico": {
      "lamina_total_anual_mm": [mm],
      "coeficiente_cultivo_kc": {"inicial": [kc], "medio": [kc], "final": [kc]}
    },
    "sistemas_riego": [
      {
        "sistema": "[Goteo/Aspersión/Gravedad]",
        "eficiencia_pct": [%],
        "costo_instalacion_ha": [MXN],
        "costo_operacion_anual": [MXN],
        "recomendacion": "[cuándo usar]"
      }
    ]
  }"#,
    ),
    (
        "costos_produccion_detallados",
        r#"  "costos_produccion_detallados": {
    "establecimiento_primer_año": {
      "preparacion_terreno": {"barbecho": [MXN], "nivelacion": [MXN], "subtotal": [MXN]},
      "material_vegetal": [MXN],
      "infraestructura": {"riego": [MXN], "subtotal": [MXN]},
      "total_establecimiento": [MXN]
    },
    "operacion_anual_produccion": {
      "año_plena_produccion": {
        "produccion_t_ha": [número],
        "ingreso": [MXN],
        "costos_operacion": {
          "fertilizantes": [MXN],
          "control_fitosanitario": [MXN],
          "riego": [MXN],
          "cosecha": [MXN],
          "subtotal": [MXN]
        },
        "utilidad": [MXN],
        "margen_pct": [%]
      }
    },
    "analisis_rentabilidad": {
      "inversion_inicial_ha": [MXN],
      "utilidad_neta_anual_ha": [MXN],
      "roi_pct": [%],
      "años_recuperacion": [años]
    }
  }"#,
    ),
    (
        "mercado_comercializacion",
        r#"  "mercado_comercializacion": {
    "canales_venta": [
      {"canal": "[Central/Supermercado]", "participacion_pct": [%], "precio_kg": [MXN], "pago": "[condiciones]"}
    ],
    "temporadas_precios": [
      {"meses": "[meses]", "oferta": "Alta/Media/Baja", "precio_mxn_kg": [precio]}
    ]
  }"#,
    ),
    (
        "postcosecha",
        r#"  "postcosecha": {
    "punto_cosecha": {"indicadores": ["[indicador 1]"]},
    "vida_util_dias": [días],
    "temperatura_almacen": "[°C]",
    "humedad_relativa": "[%]",
    "perdidas_postcosecha_pct": [%]
  }"#,
    ),
    (
        "alertas_riesgos",
        r#"  "alertas_riesgos": {
    "climaticas": {
      "heladas": {"temperatura_critica": "[°C]", "meses_riesgo": ["[mes]"], "mitigacion": ["[método]"]},
      "sequia": {"etapa_critica": "[etapa]", "mitigacion": ["[método]"]}
    },
    "fitosanitarias": {
      "principal": {"nombre": "[plaga/enfermedad]", "nivel": "[riesgo]", "impacto": "[descripción]"}
    },
    "economicas": {
      "volatilidad_precio": {"epoca": "[cuándo]", "causa": "[por qué]"}
    }
  }"#,
    ),
    (
        "recursos_asistencia",
        r#"  "recursos_asistencia": {
    "instituciones": [
      {"nombre": "[INIFAP/FIRA/SAGARPA]", "servicios": ["[servicio 1]"], "contacto": "[teléfono/web]"}
    ],
    "programas_apoyo": ["[programa 1]"]
  }"#,
    ),
    (
        "buenas_practicas_destacadas",
        r#"  "buenas_practicas_destacadas": [
    {"practica": "[nombre]", "importancia": "Crítica/Alta", "beneficio": "[qué logra]"}
  ]"#,
    ),
    (
        "errores_comunes_evitar",
        r#"  "errores_comunes_evitar": [
    {"error": "[error]", "consecuencia": "[qué pasa]", "solucion": "[cómo evitar]"}
  ]"#,
    ),
    (
        "conclusiones_recomendaciones",
        r#"  "conclusiones_recomendaciones": {
    "viabilidad_general": "[Alta/Media/Baja]",
    "regiones_mayor_potencial": ["[región: razón]"],
    "claves_exito": ["[clave 1]"],
    "limitantes_principales": ["[limitante 1]"],
    "recomendacion_final": "[síntesis]"
  }"#,
    ),
];

const GAP_INSTRUCTIONS: &str = r#"
INSTRUCCIONES:
1. USA DATOS REALES de México (SIAP, INIFAP 2023-2024)
2. Precios en PESOS MEXICANOS actuales
3. Productos REGISTRADOS en México
4. Instituciones MEXICANAS reales
5. Responde SOLO el JSON, sin texto adicional
6. COMPLETA todas las secciones listadas arriba
"#;

const NEW_CROP_INSTRUCTIONS: &str = r#"
INSTRUCCIONES CRÍTICAS:
1. USA DATOS REALES de México 2023-2024 (SIAP, INIFAP, FIRA)
2. Precios y costos en PESOS MEXICANOS actuales
3. Estados productores MEXICANOS específicos
4. Productos químicos REGISTRADOS en México (COFEPRIS)
5. Instituciones y programas MEXICANOS reales
6. Números realistas basados en estadísticas oficiales
7. Si es cultivo poco común en México, indica "producción incipiente" o "potencial emergente"
8. Responde SOLO el JSON, sin texto antes o después
9. COMPLETA TODAS las secciones con datos coherentes
"#;

/// Sections generated when a base record is expanded into a detailed profile.
pub const EXPANSION_SECTIONS: &[&str] = &[
    "economia_expandida",
    "costos_produccion_detallados",
    "calendarios_regionales",
    "plagas_detalladas",
    "programa_fertilizacion",
    "sistemas_riego",
    "mercado_comercializacion",
    "postcosecha",
    "analisis_rentabilidad",
    "alertas_riesgos",
    "recursos_asistencia",
    "recomendaciones_clave",
];

const EXPANSION_TEMPLATE: &str = r#"{
  "economia_expandida": {
    "precio_min_mxn_ton": [precio mínimo histórico],
    "precio_max_mxn_ton": [precio máximo histórico],
    "epoca_mejor_precio": "[meses]",
    "epoca_peor_precio": "[meses]",
    "valor_produccion_millones_mxn": [valor total],
    "margen_utilidad_promedio_pct": [porcentaje]
  },
  "costos_produccion_detallados": {
    "establecimiento_primer_año": { "preparacion_terreno": [MXN], "material_vegetal": [MXN], "infraestructura_riego": [MXN], "total": [MXN] },
    "operacion_anual": { "fertilizantes": [MXN], "control_plagas": [MXN], "riego_energia": [MXN], "mano_obra": [MXN], "cosecha": [MXN], "total": [MXN] },
    "costo_por_kg_produccion": [MXN],
    "punto_equilibrio_ton_ha": [toneladas]
  },
  "calendarios_regionales": [
    { "region": "[Estado/región]", "altitud_msnm": "[rango]", "siembra_inicio": "[mes]", "siembra_fin": "[mes]", "cosecha_inicio": "[mes]", "cosecha_fin": "[mes]", "rendimiento_esperado_t_ha": [t/ha], "ventana_comercial": "[mercado]" }
  ],
  "plagas_detalladas": [
    {
      "nombre": "[Nombre común]",
      "nombre_cientifico": "[Nombre científico]",
      "tipo": "Plaga/Enfermedad",
      "descripcion": "[Daño]",
      "umbral_economico": "[Cuándo controlar]",
      "control_quimico": [ { "ingrediente_activo": "[Nombre]", "nombre_comercial": "[Marca México]", "dosis": "[dosis/ha]", "costo_aplicacion_ha": [MXN] } ],
      "control_biologico": "[Alternativas]",
      "epoca_mayor_incidencia": "[meses]"
    }
  ],
  "programa_fertilizacion": [
    { "etapa": "[Etapa fenológica]", "formula": "[NPK + micro]", "dosis_kg_ha": [kg], "metodo_aplicacion": "[Método]", "costo_ha": [MXN] }
  ],
  "sistemas_riego": [
    { "sistema": "[Goteo/Aspersión]", "eficiencia_pct": [%], "costo_instalacion_ha": [MXN], "costo_operacion_anual": [MXN], "lamina_anual_mm": [mm], "recomendacion": "[Cuándo usar]" }
  ],
  "mercado_comercializacion": {
    "canales_venta": [ { "canal": "[Central de Abasto/Supermercado]", "participacion_pct": [%], "precio_promedio_kg": [MXN], "condiciones_pago": "[días/contado]" } ],
    "temporadas_precio": [ { "meses": "[rango]", "oferta": "Alta/Media/Baja", "precio_mxn_kg": [MXN] } ],
    "destinos_principales": [ { "ciudad": "[Ciudad]", "porcentaje": [%] } ]
  },
  "postcosecha": {
    "punto_cosecha": "[Indicadores]",
    "vida_util_dias": [días],
    "temperatura_almacen": "[rango °C]",
    "humedad_relativa": "[rango %]",
    "perdidas_postcosecha_pct": [%],
    "empaque_recomendado": "[Tipo]"
  },
  "analisis_rentabilidad": {
    "inversion_inicial_ha": [MXN],
    "ingreso_anual_esperado_ha": [MXN],
    "utilidad_neta_anual_ha": [MXN],
    "roi_pct": [%],
    "años_recuperacion": [años],
    "riesgo": "Bajo/Medio/Alto"
  },
  "alertas_riesgos": [
    { "tipo": "Climático/Fitosanitario/Económico", "riesgo": "[Descripción]", "probabilidad": "Alta/Media/Baja", "impacto": "[Impacto económico]", "mitigacion": "[Prevención]" }
  ],
  "recursos_asistencia": {
    "instituciones": [ { "nombre": "[INIFAP/FIRA]", "servicios": ["[servicio]"], "contacto": "[teléfono/web]" } ],
    "programas_apoyo_disponibles": ["[programa]"]
  },
  "recomendaciones_clave": ["[Recomendación práctica]"]
}"#;

const EXPANSION_INSTRUCTIONS: &str = r#"
IMPORTANTE:
- USA DATOS REALES de México (SIAP, INIFAP, FIRA)
- Precios y costos en PESOS MEXICANOS actuales
- Estados y regiones MEXICANAS
- Productos químicos REGISTRADOS en México
- Instituciones y programas MEXICANOS
- Responde SOLO con el JSON, sin texto adicional
"#;

/// Minimal description of a crop that has no profile yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropSeed {
    pub nombre_cientifico: String,
    pub familia: String,
    pub categoria: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nota: Option<String>,
}

/// JSON skeleton of one section, or a generic placeholder for sections
/// without a template.
pub fn section_template(section: &str) -> String {
    SECTION_TEMPLATES
        .iter()
        .find(|(name, _)| *name == section)
        .map(|(_, template)| template.to_string())
        .unwrap_or_else(|| format!("  \"{}\": {{ \"[clave]\": \"[valor]\" }}", section))
}

fn skeleton<'a>(sections: impl IntoIterator<Item = &'a str>) -> String {
    let body: Vec<String> = sections.into_iter().map(section_template).collect();
    format!("{{\n{}\n}}", body.join(",\n"))
}

fn display_or_na(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "N/A".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Request asking only for the sections the gap report flags.
///
/// Returns `None` when the report has nothing to fill.
pub fn build_gap_prompt(crop_name: &str, crop: &Value, report: &GapReport) -> Option<String> {
    if report.is_complete() {
        return None;
    }

    let mut context = Vec::new();
    if let Some(stats) = value_at(crop, &["estadisticas"]) {
        context.push(format!(
            "Rendimiento: {} t/ha",
            display_or_na(value_at(stats, &["rendimiento_promedio_t_por_ha"]))
        ));
        context.push(format!(
            "Precio: ${} MXN/ton",
            display_or_na(value_at(stats, &["precio_medio_mxn_ton"]))
        ));
    }

    let missing: Vec<String> = report
        .sections_to_fill()
        .map(|section| {
            let detail = report
                .detail(section)
                .map(|d| d.to_string())
                .unwrap_or_else(|| "completar".to_string());
            format!("- {}: {}", section, detail)
        })
        .collect();

    let mut sections: Vec<&str> = report.sections_to_fill().collect();
    if report.detail(PESTS_WITHOUT_CONTROL).is_some() && !sections.contains(&"plagas_y_enfermedades") {
        sections.push("plagas_y_enfermedades");
    }

    Some(format!(
        "Eres experto agronómico mexicano. Completa SOLO la información FALTANTE para {name}.\n\n\
         CONTEXTO EXISTENTE:\n{context}\n\n\
         INFORMACIÓN QUE FALTA (generar SOLO esto):\n{missing}\n\n\
         GENERA un JSON con SOLO las secciones faltantes. Ejemplo de estructura:\n\n\
         {skeleton}\n{instructions}",
        name = crop_name,
        context = context.join("\n"),
        missing = missing.join("\n"),
        skeleton = skeleton(sections),
        instructions = GAP_INSTRUCTIONS,
    ))
}

/// Request for the detailed sections of a base record, seeded with its
/// headline statistics.
pub fn build_expand_prompt(crop_name: &str, base: &Value) -> String {
    let stat = |key: &str| display_or_na(value_at(base, &["estadisticas", key]));
    let states = value_at(base, &["estadisticas", "principales_estados"])
        .and_then(Value::as_array)
        .map(|states| {
            states
                .iter()
                .map(|s| display_or_na(Some(s)))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|joined| !joined.is_empty())
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "Eres experto agronómico mexicano. Genera información DETALLADA y PRECISA para el cultivo de {name} en México.\n\n\
         DATOS BASE DISPONIBLES:\n\
         - Rendimiento: {yield_} t/ha\n\
         - Precio promedio: ${price} MXN/ton\n\
         - Producción: {production} mil toneladas\n\
         - Estados principales: {states}\n\n\
         GENERA un JSON con la siguiente estructura EXACTA (SOLO el JSON):\n\n\
         {template}\n{instructions}",
        name = crop_name,
        yield_ = stat("rendimiento_promedio_t_por_ha"),
        price = stat("precio_medio_mxn_ton"),
        production = stat("produccion_miles_ton"),
        states = states,
        template = EXPANSION_TEMPLATE,
        instructions = EXPANSION_INSTRUCTIONS,
    )
}

/// Request for a complete profile of a crop that is not in the collection yet.
pub fn build_new_crop_prompt(name: &str, seed: &CropSeed, schema: &ReferenceSchema) -> String {
    let header = format!(
        "  \"cultivo\": \"{}\",\n  \"nombre_cientifico\": \"{}\",\n  \"familia\": \"{}\",\n  \"categoria\": \"{}\"",
        name, seed.nombre_cientifico, seed.familia, seed.categoria
    );
    let sections: Vec<String> = schema
        .sections()
        .iter()
        .map(|s| section_template(&s.name))
        .collect();

    let mut basics = vec![
        format!("- Nombre científico: {}", seed.nombre_cientifico),
        format!("- Familia: {}", seed.familia),
        format!("- Categoría: {}", seed.categoria),
    ];
    if let Some(alias) = &seed.alias {
        basics.push(format!("- También conocido como: {}", alias));
    }
    if let Some(nota) = &seed.nota {
        basics.push(format!("- Nota: {}", nota));
    }

    format!(
        "Eres experto agronómico mexicano. Genera información ULTRA-DETALLADA para el cultivo de {name} en México.\n\n\
         INFORMACIÓN BÁSICA:\n{basics}\n\n\
         GENERA un JSON COMPLETO con esta estructura (responde SOLO JSON válido, sin texto adicional):\n\n\
         {{\n{header},\n\n{sections}\n}}\n{instructions}",
        name = name,
        basics = basics.join("\n"),
        header = header,
        sections = sections.join(",\n\n"),
        instructions = NEW_CROP_INSTRUCTIONS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::analyze;
    use serde_json::json;

    #[test]
    fn test_every_default_section_has_a_template() {
        for section in ReferenceSchema::default().sections() {
            assert!(
                SECTION_TEMPLATES.iter().any(|(name, _)| *name == section.name),
                "no template for {}",
                section.name
            );
        }
        assert!(section_template("otra_seccion").contains("\"otra_seccion\""));
    }

    #[test]
    fn test_gap_prompt_lists_only_missing_sections() {
        let crop = json!({
            "estadisticas": {"rendimiento_promedio_t_por_ha": 12.5, "produccion": 1, "economia": 1, "principales_estados": ["Sonora"]},
            "meta": {"version": "2.0"}
        });
        let schema = ReferenceSchema::from_pairs(&[
            ("meta", &["version", "fecha_actualizacion"]),
            ("estadisticas", &["produccion"]),
            ("postcosecha", &[]),
        ]);
        let report = analyze(&crop, &schema);
        let prompt = build_gap_prompt("Durazno", &crop, &report).unwrap();

        assert!(prompt.contains("para Durazno"));
        assert!(prompt.contains("Rendimiento: 12.5 t/ha"));
        assert!(prompt.contains("Precio: $N/A MXN/ton"));
        assert!(prompt.contains("- postcosecha: Sección completa ausente"));
        assert!(prompt.contains("- meta: Faltan: fecha_actualizacion"));
        assert!(prompt.contains("\"vida_util_dias\""));
        assert!(!prompt.contains("\"estadisticas\": {"));
    }

    #[test]
    fn test_gap_prompt_adds_pest_template_for_uncontrolled_pests() {
        let crop = json!({"plagas_y_enfermedades": {"principales": [{"nombre": "Pulgón"}]}});
        let schema = ReferenceSchema::from_pairs(&[
            ("plagas_y_enfermedades", &["principales"]),
            ("riego", &[]),
        ]);
        let report = analyze(&crop, &schema);
        let prompt = build_gap_prompt("Maíz", &crop, &report).unwrap();
        assert!(prompt.contains("\"estrategia_mip\""));
    }

    #[test]
    fn test_complete_crop_has_no_prompt() {
        let crop = json!({"riego": {"sistemas_riego": [1]}});
        let schema = ReferenceSchema::from_pairs(&[("riego", &["sistemas_riego"])]);
        let report = analyze(&crop, &schema);
        assert!(build_gap_prompt("Maíz", &crop, &report).is_none());
    }

    #[test]
    fn test_skeleton_is_valid_json_shape() {
        let text = skeleton(["meta", "postcosecha"]);
        assert!(text.starts_with("{\n  \"meta\""));
        assert!(text.ends_with("\n}"));
        assert_eq!(text.matches("\"postcosecha\"").count(), 1);
    }

    #[test]
    fn test_new_crop_prompt_includes_seed_and_all_sections() {
        let seed = CropSeed {
            nombre_cientifico: "Beta vulgaris".to_string(),
            familia: "Amaranthaceae".to_string(),
            categoria: "hortaliza".to_string(),
            alias: Some("Remolacha".to_string()),
            nota: None,
        };
        let prompt = build_new_crop_prompt("Betabel", &seed, &ReferenceSchema::default());
        assert!(prompt.contains("\"cultivo\": \"Betabel\""));
        assert!(prompt.contains("Remolacha"));
        for section in ReferenceSchema::default().sections() {
            assert!(prompt.contains(&format!("\"{}\"", section.name)));
        }
    }

    #[test]
    fn test_expand_prompt_carries_base_statistics() {
        let base = json!({
            "estadisticas": {
                "rendimiento_promedio_t_por_ha": 3.8,
                "precio_medio_mxn_ton": 5200,
                "principales_estados": ["Sinaloa", "Jalisco"]
            }
        });
        let prompt = build_expand_prompt("Maíz", &base);
        assert!(prompt.contains("cultivo de Maíz"));
        assert!(prompt.contains("- Rendimiento: 3.8 t/ha"));
        assert!(prompt.contains("- Precio promedio: $5200 MXN/ton"));
        assert!(prompt.contains("- Producción: N/A mil toneladas"));
        assert!(prompt.contains("- Estados principales: Sinaloa, Jalisco"));
        for section in EXPANSION_SECTIONS {
            assert!(prompt.contains(&format!("\"{}\"", section)), "{} missing", section);
        }
    }

    #[test]
    fn test_expand_prompt_without_statistics() {
        let prompt = build_expand_prompt("Nopal", &json!({"nombre": "Nopal"}));
        assert!(prompt.contains("- Rendimiento: N/A t/ha"));
        assert!(prompt.contains("- Estados principales: N/A"));
    }
}
