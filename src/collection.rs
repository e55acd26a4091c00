use crate::error::{CropProfileError, Result};
use crate::utils::kind_name;
use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const CROPS_KEY: &str = "cultivos";
pub const META_KEY: &str = "meta";

/// A crop collection file: `{"meta": {...}, "cultivos": {name: profile}}`.
///
/// Top-level keys other than `meta` and `cultivos` are carried through
/// untouched, written between the two.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CropCollection {
    meta: Map<String, Value>,
    extra: Map<String, Value>,
    crops: Map<String, Value>,
}

impl CropCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already-parsed document.
    ///
    /// A missing `cultivos` key is treated as an empty collection; a
    /// `cultivos` that is not a mapping is rejected. A non-mapping `meta` is
    /// dropped.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(CropProfileError::InvalidCollection(
                "root must be a JSON object".to_string(),
            ));
        };

        let crops = match root.shift_remove(CROPS_KEY) {
            None => Map::new(),
            Some(Value::Object(crops)) => crops,
            Some(other) => {
                return Err(CropProfileError::InvalidCollection(format!(
                    "'{}' must be a mapping of crop name to profile, found {}",
                    CROPS_KEY,
                    kind_name(&other)
                )))
            }
        };

        let meta = match root.shift_remove(META_KEY) {
            Some(Value::Object(meta)) => meta,
            _ => Map::new(),
        };

        Ok(Self {
            meta,
            extra: root,
            crops,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_value(read_json(path)?)
    }

    /// Like [`CropCollection::load`], but a missing file yields an empty collection.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(CropProfileError::InputNotFound(_)) => Ok(Self::new()),
            other => other,
        }
    }

    /// Empty collection that inherits `meta` and the extra top-level keys of `self`.
    pub fn empty_like(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            extra: self.extra.clone(),
            crops: Map::new(),
        }
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.meta
    }

    /// Top-level keys besides `meta` and `cultivos`.
    pub fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }

    pub fn crops(&self) -> &Map<String, Value> {
        &self.crops
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.crops.get(name)
    }

    pub fn len(&self) -> usize {
        self.crops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }

    /// Inserts or replaces a crop, keeping its original position when replacing.
    pub fn upsert_crop(&mut self, name: impl Into<String>, profile: Value) {
        self.crops.insert(name.into(), profile);
    }

    /// Records the update time and crop count in `meta`.
    pub fn stamp_updated(&mut self, now: DateTime<Local>) {
        self.meta.insert(
            "ultima_actualizacion".to_string(),
            Value::String(now.to_rfc3339()),
        );
        self.meta
            .insert("total_cultivos".to_string(), Value::from(self.crops.len()));
    }

    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(META_KEY.to_string(), Value::Object(self.meta.clone()));
        root.extend(self.extra.clone());
        root.insert(CROPS_KEY.to_string(), Value::Object(self.crops.clone()));
        Value::Object(root)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, &self.to_value(), true)
    }

    pub fn save_compact(&self, path: &Path) -> Result<()> {
        write_json(path, &self.to_value(), false)
    }
}

/// Reads a JSON file, mapping a missing file to [`CropProfileError::InputNotFound`].
pub fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CropProfileError::InputNotFound(path.to_path_buf()),
        _ => CropProfileError::IoError(e),
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Writes `value` as UTF-8 JSON, creating parent directories as needed.
pub fn write_json(path: &Path, value: &Value, pretty: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_crops_key_is_empty_collection() {
        let collection = CropCollection::from_value(json!({"meta": {"v": 1}})).unwrap();
        assert!(collection.is_empty());
        assert_eq!(collection.meta()["v"], 1);
    }

    #[test]
    fn test_list_of_crops_is_rejected() {
        let err = CropCollection::from_value(json!({"cultivos": [{"nombre": "Maíz"}]})).unwrap_err();
        assert!(matches!(err, CropProfileError::InvalidCollection(_)));
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut collection =
            CropCollection::from_value(json!({"cultivos": {"Maíz": {}, "Frijol": {}}})).unwrap();
        collection.upsert_crop("Maíz", json!({"meta": {"version": "2.0"}}));
        collection.upsert_crop("Canola", json!({}));
        let names: Vec<&String> = collection.crops().keys().collect();
        assert_eq!(names, vec!["Maíz", "Frijol", "Canola"]);
        assert_eq!(collection.get("Maíz").unwrap()["meta"]["version"], "2.0");
    }

    #[test]
    fn test_stamp_updated_counts_crops() {
        let mut collection = CropCollection::new();
        collection.upsert_crop("Setas", json!({}));
        collection.stamp_updated(Local::now());
        assert_eq!(collection.meta()["total_cultivos"], 1);
        assert!(collection.meta()["ultima_actualizacion"].is_string());
    }

    #[test]
    fn test_save_and_load_round_trip_keeps_accents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cultivos.json");
        let mut collection = CropCollection::new();
        collection.upsert_crop("Champiñón", json!({"familia": "Agaricaceae"}));
        collection.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Champiñón"));

        let loaded = CropCollection::load(&path).unwrap();
        assert_eq!(loaded, collection);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CropCollection::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, CropProfileError::InputNotFound(_)));
        assert!(CropCollection::load_or_default(Path::new("/definitely/not/here.json"))
            .unwrap()
            .is_empty());
    }
}
