//! In-memory fakes standing in for the real graph/vector backends in tests
//! (SPEC_FULL.md "Test tooling"). Shared across `version_manager`,
//! `deletion`, and `upgrade`'s test modules.
#![cfg(test)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitemporal_core::backend::{GraphRow, GraphStore, ParamValue, QueryParams, VectorHit, VectorIndex, VectorStore};
use bitemporal_core::error::BackendError;
use bitemporal_core::models::{FilterExpr, VectorIndexKind};

/// A graph store backed by a fixed table of canned responses, keyed by the
/// literal query text a test hands it. Panics on an unrecognized query so a
/// test fails loudly instead of silently returning nothing.
#[derive(Default)]
pub struct FakeGraphStore {
    responses: Mutex<BTreeMap<String, Vec<GraphRow>>>,
    sequences: Mutex<BTreeMap<String, (Vec<Vec<GraphRow>>, usize)>>,
    pub executed: Mutex<Vec<(String, QueryParams)>>,
}

impl FakeGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stub(&self, query_contains: impl Into<String>, rows: Vec<GraphRow>) {
        self.responses.lock().unwrap().insert(query_contains.into(), rows);
    }

    /// Like `stub`, but returns a different canned response on each
    /// successive matching call (sticking to the last one once exhausted) —
    /// needed to simulate a paged query whose result shrinks as a caller's
    /// own writes take effect.
    pub fn stub_sequence(&self, query_contains: impl Into<String>, responses: Vec<Vec<GraphRow>>) {
        self.sequences.lock().unwrap().insert(query_contains.into(), (responses, 0));
    }

    fn lookup(&self, query: &str) -> Vec<GraphRow> {
        let mut sequences = self.sequences.lock().unwrap();
        for (key, (responses, next)) in sequences.iter_mut() {
            if query.contains(key.as_str()) {
                let response = responses.get(*next).or_else(|| responses.last()).cloned().unwrap_or_default();
                if *next + 1 < responses.len() {
                    *next += 1;
                }
                return response;
            }
        }
        drop(sequences);

        self.responses
            .lock()
            .unwrap()
            .iter()
            .find(|(key, _)| query.contains(key.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn execute_query(&self, query: &str, params: QueryParams) -> Result<Vec<GraphRow>, BackendError> {
        self.executed.lock().unwrap().push((query.to_string(), params));
        Ok(self.lookup(query))
    }

    async fn execute_query_with_retry(
        &self,
        query: &str,
        params: QueryParams,
        _max_attempts: u32,
        _max_wait: Duration,
    ) -> Result<Vec<GraphRow>, BackendError> {
        self.execute_query(query, params).await
    }

    fn node_id(&self, field_expr: &str) -> String {
        format!("id({field_expr})")
    }

    fn property_assignment(&self, key: &str, param_ref: &str) -> String {
        format!("s.{key} = {param_ref}")
    }
}

pub fn row(pairs: impl IntoIterator<Item = (&'static str, ParamValue)>) -> GraphRow {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// A vector index whose `update_versioning`/`enable_for_versioning` calls
/// fail for a preconfigured set of ids on the first `fail_attempts` calls,
/// then succeed — enough to exercise `retry::retry_failed_ids` end to end.
pub struct FakeVectorIndex {
    kind: VectorIndexKind,
    pub always_failing_ids: Mutex<Vec<String>>,
    pub update_calls: Mutex<Vec<Vec<String>>>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeVectorIndex {
    pub fn new(kind: VectorIndexKind) -> Self {
        Self {
            kind,
            always_failing_ids: Mutex::new(Vec::new()),
            update_calls: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for FakeVectorIndex {
    fn index_name(&self) -> VectorIndexKind {
        self.kind
    }

    async fn top_k(&self, _query: &str, _k: usize, _filter: Option<&FilterExpr>) -> Result<Vec<VectorHit>, BackendError> {
        Ok(Vec::new())
    }

    async fn update_versioning(&self, _valid_to: i64, node_ids: &[String]) -> Result<Vec<String>, BackendError> {
        self.update_calls.lock().unwrap().push(node_ids.to_vec());
        let always_failing = self.always_failing_ids.lock().unwrap();
        Ok(node_ids.iter().filter(|id| always_failing.contains(id)).cloned().collect())
    }

    async fn enable_for_versioning(&self, node_ids: &[String]) -> Result<Vec<String>, BackendError> {
        let always_failing = self.always_failing_ids.lock().unwrap();
        Ok(node_ids.iter().filter(|id| always_failing.contains(id)).cloned().collect())
    }

    async fn delete_embeddings(&self, node_ids: &[String]) -> Result<(), BackendError> {
        self.deleted.lock().unwrap().extend(node_ids.iter().cloned());
        Ok(())
    }
}

pub struct FakeVectorStore {
    pub indexes: Vec<Arc<dyn VectorIndex>>,
}

impl FakeVectorStore {
    pub fn new(indexes: Vec<Arc<dyn VectorIndex>>) -> Self {
        Self { indexes }
    }
}

impl VectorStore for FakeVectorStore {
    fn all_indexes(&self) -> Vec<Arc<dyn VectorIndex>> {
        self.indexes.clone()
    }
}
