//! Backend Abstractions (§4.A) — the only surface through which the engine
//! touches the outside world. Two capabilities: a property-graph store and
//! one dense-vector index per artifact type, collected behind a `VectorStore`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use crate::error::BackendError;
use crate::models::VectorIndexKind;

/// A parameter or result-cell value exchanged with the graph backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    List(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        ParamValue::List(v)
    }
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ParamValue::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }
}

/// Bound query parameters, keyed by placeholder name.
pub type QueryParams = BTreeMap<String, ParamValue>;

/// One result row, keyed by the projection alias used in the query.
pub type GraphRow = BTreeMap<String, ParamValue>;

/// A single retrieval hit returned from `VectorIndex::top_k`.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub node_id: String,
    pub score: f32,
    pub metadata: JsonMap<String, JsonValue>,
}

/// Minimal contract the core needs from a property-graph backend.
///
/// Implementations are expected to be cheap to clone (an `Arc` around a
/// connection pool, typically) since the engine holds one for its lifetime.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Read-only query. No retries: callers that need durability against
    /// transient backend errors use `execute_query_with_retry`.
    async fn execute_query(&self, query: &str, params: QueryParams) -> Result<Vec<GraphRow>, BackendError>;

    /// Mutating query, retried with capped backoff on transient errors.
    async fn execute_query_with_retry(
        &self,
        query: &str,
        params: QueryParams,
        max_attempts: u32,
        max_wait: Duration,
    ) -> Result<Vec<GraphRow>, BackendError>;

    /// Backend-specific projection for the canonical node identifier, e.g.
    /// `s.sourceId` might render to `id(s)` on one backend and `s.source_id`
    /// on another.
    fn node_id(&self, field_expr: &str) -> String;

    /// Backend-specific value coercion for a `SET key = <value>` assignment,
    /// given the bound parameter reference that will carry `value`.
    fn property_assignment(&self, key: &str, param_ref: &str) -> String;

    /// Releases backend resources (e.g. a pooled connection). Left to each
    /// concrete backend to call from its own `Drop` impl; the engine never
    /// needs to call it directly since it only ever holds a shared `Arc<dyn
    /// GraphStore>`.
    fn close(&self) {}
}

/// One dense-vector index, covering a single artifact type.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn index_name(&self) -> VectorIndexKind;

    /// True for the no-op placeholder used when a deployment doesn't run an
    /// index for a given artifact type; the core skips these everywhere.
    fn is_dummy(&self) -> bool {
        false
    }

    async fn top_k(
        &self,
        query: &str,
        k: usize,
        filter: Option<&crate::models::FilterExpr>,
    ) -> Result<Vec<VectorHit>, BackendError>;

    /// Updates `valid_to` on each of `node_ids`. Returns the subset that
    /// failed (for the caller to retry), never an error for a partial
    /// failure — only for a wholesale backend failure.
    async fn update_versioning(&self, valid_to: i64, node_ids: &[String]) -> Result<Vec<String>, BackendError>;

    /// Idempotent one-time retrofit that materializes a `valid_to` field on
    /// legacy vectors that predate versioning. Returns failed ids.
    async fn enable_for_versioning(&self, node_ids: &[String]) -> Result<Vec<String>, BackendError>;

    async fn delete_embeddings(&self, node_ids: &[String]) -> Result<(), BackendError>;
}

/// Collects every vector index a deployment runs.
pub trait VectorStore: Send + Sync {
    fn all_indexes(&self) -> Vec<std::sync::Arc<dyn VectorIndex>>;

    fn index(&self, kind: VectorIndexKind) -> Option<std::sync::Arc<dyn VectorIndex>> {
        self.all_indexes().into_iter().find(|index| index.index_name() == kind)
    }
}

/// No-op vector index for artifact types a deployment doesn't run. Answers
/// every query with empty results and is skipped by the core wherever it
/// would otherwise issue a write.
pub struct DummyVectorIndex {
    kind: VectorIndexKind,
}

impl DummyVectorIndex {
    pub fn new(kind: VectorIndexKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl VectorIndex for DummyVectorIndex {
    fn index_name(&self) -> VectorIndexKind {
        self.kind
    }

    fn is_dummy(&self) -> bool {
        true
    }

    async fn top_k(
        &self,
        _query: &str,
        _k: usize,
        _filter: Option<&crate::models::FilterExpr>,
    ) -> Result<Vec<VectorHit>, BackendError> {
        Ok(Vec::new())
    }

    async fn update_versioning(&self, _valid_to: i64, _node_ids: &[String]) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }

    async fn enable_for_versioning(&self, _node_ids: &[String]) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }

    async fn delete_embeddings(&self, _node_ids: &[String]) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dummy_index_is_always_empty() {
        let dummy = DummyVectorIndex::new(VectorIndexKind::Fact);
        assert!(dummy.is_dummy());
        assert!(dummy.top_k("q", 5, None).await.unwrap().is_empty());
        assert!(dummy.update_versioning(1, &["a".into()]).await.unwrap().is_empty());
        assert!(dummy.enable_for_versioning(&["a".into()]).await.unwrap().is_empty());
        dummy.delete_embeddings(&["a".into()]).await.unwrap();
    }
}
