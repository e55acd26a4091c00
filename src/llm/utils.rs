use crate::error::{CropProfileError, Result};
use serde_json::{Map, Value};

/// Drops markdown code fences (```json ... ```) wherever they appear.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Extracts the JSON object embedded in a free-form model response.
///
/// Leading and trailing prose are ignored: the object is taken to span from
/// the first `{` to the last `}`.
pub fn parse_patch(raw: &str) -> Result<Map<String, Value>> {
    let cleaned = strip_code_fences(raw);
    let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) else {
        return Err(CropProfileError::ResponseParse(
            "no JSON object found in response".to_string(),
        ));
    };
    if end < start {
        return Err(CropProfileError::ResponseParse(
            "no JSON object found in response".to_string(),
        ));
    }

    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CropProfileError::ResponseParse(format!(
            "expected a JSON object, found {}",
            crate::utils::kind_name(&other)
        ))),
        Err(e) => Err(CropProfileError::ResponseParse(e.to_string())),
    }
}
