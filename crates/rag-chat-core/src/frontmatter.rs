//! Best-effort YAML front-matter extraction.
//!
//! A front-matter block is a `---` line at the very top of a document,
//! followed by YAML, closed by another `---` line. Only the requested keys
//! are kept, and only when their values are scalars (string, number, bool).
//!
//! Extraction never fails. A missing or unterminated block yields no fields
//! and leaves the body untouched; malformed YAML or non-scalar values yield
//! no fields for the affected keys while the block is still skipped.

use serde_json::Value;

use crate::models::Metadata;

/// Result of [`extract`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub fields: Metadata,
    /// Byte offset where the document body starts (0 without a block).
    pub body_start: usize,
}

pub fn extract(text: &str, keys: &[String]) -> FrontMatter {
    let Some((yaml, body_start)) = locate(text) else {
        return FrontMatter::default();
    };

    let mut fields = Metadata::new();
    if let Ok(serde_yaml::Value::Mapping(map)) = serde_yaml::from_str::<serde_yaml::Value>(yaml) {
        for key in keys {
            if let Some(value) = map.get(key.as_str()).and_then(scalar_to_json) {
                fields.insert(key.clone(), value);
            }
        }
    }

    FrontMatter { fields, body_start }
}

/// Returns the YAML between the fences and the offset just past the
/// closing fence line.
fn locate(text: &str) -> Option<(&str, usize)> {
    let first_end = text.find('\n')?;
    if text[..first_end].trim_end_matches('\r') != "---" {
        return None;
    }
    let yaml_start = first_end + 1;

    let mut offset = yaml_start;
    for line in text[yaml_start..].split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == "---" {
            return Some((&text[yaml_start..offset], offset + line.len()));
        }
        offset += line.len();
    }
    None
}

fn scalar_to_json(value: &serde_yaml::Value) -> Option<Value> {
    match value {
        serde_yaml::Value::String(s) => Some(Value::String(s.clone())),
        serde_yaml::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(Value::from(u))
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            }
        }
        _ => None,
    }
}
