//! The dynamic metadata bag a stream node carries (§9 "Dynamic metadata
//! bags"). Modeled as a tagged-value map (`serde_json::Value`) so unknown
//! keys round-trip untouched; explicit accessors cover the `source` and
//! `source.versioning` subtrees the core actually reads and writes.

use serde_json::{Map, Value};

use crate::constants::INDEX_KEY;
use crate::models::NodeKind;

/// A node flowing through the indexing stream handed to the Version Manager.
#[derive(Debug, Clone)]
pub struct StreamNode {
    pub id: String,
    pub kind: NodeKind,
    pub metadata: Map<String, Value>,
}

impl StreamNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        let mut metadata = Map::new();
        let mut index = Map::new();
        index.insert("index".to_string(), Value::String(kind.as_str().to_string()));
        metadata.insert(INDEX_KEY.to_string(), Value::Object(index));
        Self { id: id.into(), kind, metadata }
    }

    fn source(&self) -> Option<&Map<String, Value>> {
        self.metadata.get("source")?.as_object()
    }

    fn source_mut(&mut self) -> &mut Map<String, Value> {
        ensure_map(&mut self.metadata, "source")
    }

    fn versioning(&self) -> Option<&Map<String, Value>> {
        self.source()?.get("versioning")?.as_object()
    }

    fn versioning_mut(&mut self) -> &mut Map<String, Value> {
        ensure_map(self.source_mut(), "versioning")
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source()?.get("sourceId")?.as_str()
    }

    pub fn set_source_id(&mut self, source_id: impl Into<String>) {
        self.source_mut().insert("sourceId".to_string(), Value::String(source_id.into()));
    }

    /// Per SPEC_FULL.md: prefer `source.versioning.valid_from`, falling back
    /// to `source.extract_timestamp` when absent.
    pub fn resolved_valid_from(&self) -> Option<i64> {
        self.versioning_valid_from().or_else(|| self.extract_timestamp())
    }

    pub fn versioning_valid_from(&self) -> Option<i64> {
        self.versioning()?.get("valid_from")?.as_i64()
    }

    pub fn versioning_valid_to(&self) -> Option<i64> {
        self.versioning()?.get("valid_to")?.as_i64()
    }

    pub fn extract_timestamp(&self) -> Option<i64> {
        self.source()?.get("extract_timestamp")?.as_i64()
    }

    pub fn set_extract_timestamp(&mut self, timestamp: i64) {
        self.source_mut().insert("extract_timestamp".to_string(), Value::from(timestamp));
    }

    pub fn version_independent_id_fields(&self) -> Vec<String> {
        self.versioning()
            .and_then(|v| v.get("id_fields"))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    pub fn set_version_independent_id_fields(&mut self, fields: Vec<String>) {
        let versioning = self.versioning_mut();
        versioning.insert("id_fields".to_string(), Value::Array(fields.into_iter().map(Value::String).collect()));
    }

    /// Reads `source.metadata.<field>` — the value, for each identity field,
    /// that the new source node carries for itself.
    pub fn identity_field_value(&self, field: &str) -> Option<&Value> {
        self.source()?.get("metadata")?.as_object()?.get(field)
    }

    pub fn set_identity_field(&mut self, field: &str, value: impl Into<Value>) {
        let metadata = ensure_map(self.source_mut(), "metadata");
        metadata.insert(field.to_string(), value.into());
    }

    pub fn set_versioning(&mut self, valid_from: i64, valid_to: i64) {
        let versioning = self.versioning_mut();
        versioning.insert("valid_from".to_string(), Value::from(valid_from));
        versioning.insert("valid_to".to_string(), Value::from(valid_to));
    }

    pub fn set_prev_versions(&mut self, source_ids: Vec<String>) {
        let versioning = self.versioning_mut();
        versioning.insert(
            "prev_versions".to_string(),
            Value::Array(source_ids.into_iter().map(Value::String).collect()),
        );
    }
}

fn ensure_map<'a>(parent: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    if !matches!(parent.get(key), Some(Value::Object(_))) {
        parent.insert(key.to_string(), Value::Object(Map::new()));
    }
    parent.get_mut(key).and_then(Value::as_object_mut).expect("just inserted as object")
}
