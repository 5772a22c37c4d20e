//! Schema metadata lookup.
//!
//! Field definitions are read by path, e.g. `entityDefs.Account.fields.logo.type`.

use std::path::Path;

use anyhow::Context;
use serde_json::Value;

/// Read-only, path-keyed access to schema metadata.
pub trait SchemaMetadata: Send + Sync {
    fn get(&self, path: &[&str]) -> Option<Value>;

    /// Type of a field on an entity, if the field is defined.
    fn field_type(&self, entity_type: &str, field: &str) -> Option<String> {
        self.get(&["entityDefs", entity_type, "fields", field, "type"])
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Per-field upload limit in megabytes, fractions kept. Absent, zero or non-numeric values
    /// yield `None`.
    fn field_max_file_size_mb(&self, entity_type: &str, field: &str) -> Option<f64> {
        let value = self.get(&["entityDefs", entity_type, "fields", field, "maxFileSize"])?;
        positive_megabytes(&value)
    }

    /// Largest `maxFileSize` declared on any field of any entity type.
    fn largest_max_file_size_mb(&self) -> Option<f64> {
        let entity_defs = self.get(&["entityDefs"])?;
        entity_defs
            .as_object()?
            .values()
            .filter_map(|def| def.get("fields").and_then(Value::as_object))
            .flat_map(|fields| fields.values())
            .filter_map(|field| field.get("maxFileSize").and_then(positive_megabytes))
            .reduce(f64::max)
    }
}

fn positive_megabytes(value: &Value) -> Option<f64> {
    value.as_f64().filter(|mb| mb.is_finite() && *mb > 0.0)
}

/// Metadata backed by an in-memory JSON document.
#[derive(Debug, Clone, Default)]
pub struct JsonMetadata {
    root: Value,
}

impl JsonMetadata {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema metadata from {}", path.display()))?;
        let root = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid schema metadata JSON in {}", path.display()))?;
        Ok(Self { root })
    }
}

impl SchemaMetadata for JsonMetadata {
    fn get(&self, path: &[&str]) -> Option<Value> {
        path.iter()
            .try_fold(&self.root, |node, key| node.get(*key))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> JsonMetadata {
        JsonMetadata::new(json!({
            "entityDefs": {
                "Account": {
                    "fields": {
                        "logo": { "type": "image", "maxFileSize": 5 },
                        "notes": { "type": "wysiwyg" },
                        "contract": { "type": "file", "maxFileSize": 0 },
                        "scan": { "type": "file", "maxFileSize": 1.5 }
                    }
                }
            }
        }))
    }

    #[test]
    fn test_get_walks_path() {
        let md = metadata();
        assert_eq!(
            md.get(&["entityDefs", "Account", "fields", "logo", "type"]),
            Some(json!("image"))
        );
        assert_eq!(md.get(&["entityDefs", "Lead"]), None);
    }

    #[test]
    fn test_field_type() {
        let md = metadata();
        assert_eq!(md.field_type("Account", "notes").as_deref(), Some("wysiwyg"));
        assert_eq!(md.field_type("Account", "missing"), None);
    }

    #[test]
    fn test_field_max_file_size() {
        let md = metadata();
        assert_eq!(md.field_max_file_size_mb("Account", "logo"), Some(5.0));
        assert_eq!(md.field_max_file_size_mb("Account", "contract"), None);
        assert_eq!(md.field_max_file_size_mb("Account", "notes"), None);
        assert_eq!(md.field_max_file_size_mb("Account", "scan"), Some(1.5));
    }

    #[test]
    fn test_largest_max_file_size() {
        assert_eq!(metadata().largest_max_file_size_mb(), Some(5.0));
        assert_eq!(JsonMetadata::default().largest_max_file_size_mb(), None);
        let no_limits = JsonMetadata::new(json!({
            "entityDefs": { "Note": { "fields": { "file": { "type": "file" } } } }
        }));
        assert_eq!(no_limits.largest_max_file_size_mb(), None);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(
            &path,
            r#"{"entityDefs":{"Note":{"fields":{"attachments":{"type":"attachmentMultiple"}}}}}"#,
        )
        .unwrap();
        let md = JsonMetadata::from_file(&path).unwrap();
        assert_eq!(
            md.field_type("Note", "attachments").as_deref(),
            Some("attachmentMultiple")
        );
        assert!(JsonMetadata::from_file(dir.path().join("missing.json")).is_err());
    }
}
