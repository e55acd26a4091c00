//! Shape report for a crop collection file, used to spot malformed data
//! before spending generation calls on it.

use crate::collection::{read_json, CROPS_KEY};
use crate::error::Result;
use crate::utils::{container_len, kind_name};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;

/// Crops described key by key.
const DETAILED_CROPS: usize = 3;
/// Crops checked for being mappings.
const CHECKED_CROPS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShape {
    pub key: String,
    pub kind: String,
    pub len: Option<usize>,
    /// Kind of the first element, for non-empty lists.
    pub first_element: Option<String>,
}

impl KeyShape {
    fn of(key: &str, value: &Value) -> Self {
        let first_element = match value {
            Value::Array(items) => items.first().map(|v| kind_name(v).to_string()),
            _ => None,
        };
        Self {
            key: key.to_string(),
            kind: kind_name(value).to_string(),
            len: container_len(value),
            first_element,
        }
    }
}

impl fmt::Display for KeyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.kind)?;
        if let Some(len) = self.len {
            write!(f, " (len: {})", len)?;
        }
        if let Some(first) = &self.first_element {
            write!(f, " [elements: {}]", first)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropShape {
    pub name: String,
    pub kind: String,
    pub keys: Vec<KeyShape>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub location: String,
    pub problem: String,
    pub fix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDiagnosis {
    pub file_size_bytes: Option<u64>,
    pub root_kind: String,
    pub root_keys: Vec<KeyShape>,
    pub crops_kind: Option<String>,
    pub crop_count: Option<usize>,
    pub crops: Vec<CropShape>,
    pub problems: Vec<Problem>,
}

impl StructureDiagnosis {
    pub fn is_healthy(&self) -> bool {
        self.problems.is_empty()
    }
}

impl fmt::Display for StructureDiagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(size) = self.file_size_bytes {
            writeln!(f, "Size: {:.2} MB", size as f64 / (1024.0 * 1024.0))?;
        }
        writeln!(f, "Root: {}", self.root_kind)?;
        for key in &self.root_keys {
            writeln!(f, "  - {}", key)?;
        }

        match (&self.crops_kind, self.crop_count) {
            (Some(kind), Some(count)) => writeln!(f, "'{}': {} with {} crops", CROPS_KEY, kind, count)?,
            (Some(kind), None) => writeln!(f, "'{}': {}", CROPS_KEY, kind)?,
            _ => writeln!(f, "'{}': missing", CROPS_KEY)?,
        }

        for (i, crop) in self.crops.iter().enumerate() {
            writeln!(f, "[{}] {} ({}, {} keys)", i + 1, crop.name, crop.kind, crop.keys.len())?;
            for key in &crop.keys {
                writeln!(f, "    {}", key)?;
            }
        }

        if self.problems.is_empty() {
            writeln!(f, "No problems detected")?;
        } else {
            writeln!(f, "{} problems:", self.problems.len())?;
            for p in &self.problems {
                writeln!(f, "  {}: {} ({})", p.location, p.problem, p.fix)?;
            }
        }
        Ok(())
    }
}

pub fn diagnose(document: &Value) -> StructureDiagnosis {
    let mut diagnosis = StructureDiagnosis {
        root_kind: kind_name(document).to_string(),
        ..Default::default()
    };

    let Value::Object(root) = document else {
        return diagnosis;
    };
    diagnosis.root_keys = root.iter().map(|(k, v)| KeyShape::of(k, v)).collect();

    let Some(crops) = root.get(CROPS_KEY) else {
        return diagnosis;
    };
    diagnosis.crops_kind = Some(kind_name(crops).to_string());
    diagnosis.crop_count = container_len(crops);

    let Value::Object(crops) = crops else {
        diagnosis.problems.push(Problem {
            location: CROPS_KEY.to_string(),
            problem: format!("must be a mapping, found {}", kind_name(crops)),
            fix: "convert the list to a mapping keyed by crop name".to_string(),
        });
        return diagnosis;
    };

    diagnosis.crops = crops
        .iter()
        .take(DETAILED_CROPS)
        .map(|(name, crop)| CropShape {
            name: name.clone(),
            kind: kind_name(crop).to_string(),
            keys: match crop {
                Value::Object(fields) => fields.iter().map(|(k, v)| KeyShape::of(k, v)).collect(),
                _ => Vec::new(),
            },
        })
        .collect();

    for (name, crop) in crops.iter().take(CHECKED_CROPS) {
        if !crop.is_object() {
            diagnosis.problems.push(Problem {
                location: format!("{}['{}']", CROPS_KEY, name),
                problem: format!("is a {}, must be a mapping", kind_name(crop)),
                fix: "regenerate this crop".to_string(),
            });
        }
    }

    diagnosis
}

/// Reads and diagnoses a file. Unreadable or invalid JSON is an error.
pub fn diagnose_file(path: &Path) -> Result<StructureDiagnosis> {
    let document = read_json(path)?;
    let mut diagnosis = diagnose(&document);
    diagnosis.file_size_bytes = Some(fs::metadata(path)?.len());
    Ok(diagnosis)
}
