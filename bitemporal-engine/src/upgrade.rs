//! Bulk Upgrader (§4.E) — one-time retrofit that finds every source still
//! carrying the unversioned sentinel (`valid_from == valid_to == -1`),
//! materializes `valid_to` on its vectors via `enable_for_versioning`, and
//! writes the full-open interval back onto the graph. Resumable: a source
//! whose vector update keeps failing is excluded from later pages so a
//! restarted run doesn't spin on it forever.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bitemporal_core::backend::{GraphStore, ParamValue, VectorIndex, VectorStore};
use bitemporal_core::constants::{GRAPH_RETRY_MAX_ATTEMPTS, GRAPH_RETRY_MAX_WAIT_SECS, TIMESTAMP_LOWER_BOUND, TIMESTAMP_UPPER_BOUND};
use bitemporal_core::error::VersioningError;
use bitemporal_core::models::{IndexUpgradeStats, TenantId, UpgradeConfig, UpgradeStats, VectorIndexKind};
use tracing::{debug, info};

use crate::queries::{self, DependentArtifact};
use crate::retry::retry_failed_ids;

const PAGE_SIZE: usize = 10_000;

pub struct BulkUpgrader {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    config: UpgradeConfig,
}

impl BulkUpgrader {
    pub fn new(graph: Arc<dyn GraphStore>, vectors: Arc<dyn VectorStore>, config: UpgradeConfig) -> Self {
        Self { graph, vectors, config }
    }

    /// Total sources still carrying the unversioned sentinel, for reporting
    /// progress before (or during) a run.
    pub async fn count_unversioned_sources(&self) -> Result<usize, VersioningError> {
        let (query, params) = upgrade_queries::count_unversioned();
        let rows = self.graph.execute_query(&query, params).await?;
        let count = rows.first().and_then(|row| row.get("count")).and_then(ParamValue::as_int).unwrap_or(0);
        Ok(count as usize)
    }

    async fn get_source_ids(&self, excluding: &HashSet<String>) -> Result<Vec<String>, VersioningError> {
        let (query, params) = upgrade_queries::unversioned_source_ids(excluding, PAGE_SIZE);
        let rows = self.graph.execute_query(&query, params).await?;
        Ok(rows.iter().filter_map(|row| row.get("id").and_then(ParamValue::as_str).map(str::to_string)).collect())
    }

    /// Upgrades every unversioned source for `tenant_id`, paging until no
    /// sources remain outside the accumulated failure set (§4.E step 3).
    pub async fn upgrade_tenant(&self, tenant_id: &TenantId) -> Result<UpgradeStats, VersioningError> {
        let indexes: Vec<Arc<dyn VectorIndex>> = self
            .vectors
            .all_indexes()
            .into_iter()
            .filter(|index| !index.is_dummy() && self.config.index_names.contains(&index.index_name()))
            .collect();

        let mut per_index_totals: BTreeMap<VectorIndexKind, IndexUpgradeStats> = BTreeMap::new();
        let mut failed_so_far: HashSet<String> = HashSet::new();
        let mut all_failed: Vec<String> = Vec::new();

        loop {
            let source_ids = self.get_source_ids(&failed_so_far).await?;
            if source_ids.is_empty() {
                break;
            }
            debug!(tenant_id = tenant_id.as_str(), page_size = source_ids.len(), "upgrading page of unversioned sources");

            let mut unit = UnitOfWork::new(self.graph.clone(), indexes.clone(), self.config.batch_size, self.config.max_attempts);
            for source_id in &source_ids {
                unit.stage_source(source_id).await?;
            }
            let (staged_ids, failed, stats) = unit.finish().await?;

            for (kind, delta) in stats {
                let entry = per_index_totals.entry(kind).or_default();
                entry.succeeded += delta.succeeded;
                entry.failed += delta.failed;
            }
            for id in &staged_ids {
                if failed.contains(id) {
                    failed_so_far.insert(id.clone());
                    all_failed.push(id.clone());
                }
            }
        }

        info!(tenant_id = tenant_id.as_str(), failed = all_failed.len(), "bulk upgrade complete");
        Ok(UpgradeStats { tenant_id: tenant_id.as_str().to_string(), per_index: per_index_totals, failed_source_ids: all_failed })
    }
}

/// Per-index staging buffer, flushed once it grows past `batch_size *
/// UPGRADE_FLUSH_MULTIPLIER` (§4.E "Staging").
struct VectorStoreUnitOfWork {
    index: Arc<dyn VectorIndex>,
    buffer: HashMap<String, String>,
    stats: IndexUpgradeStats,
}

impl VectorStoreUnitOfWork {
    fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index, buffer: HashMap::new(), stats: IndexUpgradeStats::default() }
    }

    fn stage(&mut self, node_id: String, source_id: String) {
        self.buffer.insert(node_id, source_id);
    }

    async fn apply(
        &mut self,
        batch_size: usize,
        max_attempts: u32,
        failed_source_ids: &mut HashSet<String>,
    ) -> Result<(), VersioningError> {
        let node_ids: Vec<String> = self.buffer.keys().cloned().collect();
        for batch in node_ids.chunks(batch_size.max(1)) {
            let index = self.index.clone();
            let outstanding = retry_failed_ids(batch.to_vec(), max_attempts, |ids| {
                let index = index.clone();
                async move { index.enable_for_versioning(&ids).await }
            })
            .await?;

            self.stats.succeeded += batch.len() - outstanding.len();
            self.stats.failed += outstanding.len();
            for id in &outstanding {
                if let Some(source_id) = self.buffer.get(id) {
                    failed_source_ids.insert(source_id.clone());
                }
            }
        }
        self.buffer.clear();
        Ok(())
    }
}

/// One page's worth of staged work across every configured vector index
/// (§4.E "Unit of work").
struct UnitOfWork {
    graph: Arc<dyn GraphStore>,
    batch_size: usize,
    max_attempts: u32,
    per_index: HashMap<VectorIndexKind, VectorStoreUnitOfWork>,
    source_ids: Vec<String>,
    failed_source_ids: HashSet<String>,
}

impl UnitOfWork {
    fn new(graph: Arc<dyn GraphStore>, indexes: Vec<Arc<dyn VectorIndex>>, batch_size: usize, max_attempts: u32) -> Self {
        let per_index = indexes.into_iter().map(|index| (index.index_name(), VectorStoreUnitOfWork::new(index))).collect();
        Self { graph, batch_size, max_attempts, per_index, source_ids: Vec::new(), failed_source_ids: HashSet::new() }
    }

    async fn stage_source(&mut self, source_id: &str) -> Result<(), VersioningError> {
        self.source_ids.push(source_id.to_string());
        let kinds: Vec<VectorIndexKind> = self.per_index.keys().copied().collect();
        for kind in kinds {
            let artifact = match kind {
                VectorIndexKind::Chunk => DependentArtifact::Chunk,
                VectorIndexKind::Topic => DependentArtifact::Topic,
                VectorIndexKind::Statement => DependentArtifact::Statement,
                VectorIndexKind::Fact => DependentArtifact::Fact,
            };
            let (query, params) = queries::dependent_ids(artifact, std::slice::from_ref(&source_id.to_string()));
            let rows = self.graph.execute_query(&query, params).await?;
            let node_ids: Vec<String> =
                rows.iter().flat_map(|row| row.get("node_ids").and_then(ParamValue::as_list).map(<[String]>::to_vec).unwrap_or_default()).collect();

            if let Some(unit) = self.per_index.get_mut(&kind) {
                for node_id in node_ids {
                    unit.stage(node_id, source_id.to_string());
                }
            }
        }
        self.maybe_flush().await
    }

    async fn maybe_flush(&mut self) -> Result<(), VersioningError> {
        let threshold = self.batch_size * bitemporal_core::constants::UPGRADE_FLUSH_MULTIPLIER;
        for unit in self.per_index.values_mut() {
            if unit.buffer.len() >= threshold {
                unit.apply(self.batch_size, self.max_attempts, &mut self.failed_source_ids).await?;
            }
        }
        Ok(())
    }

    /// Flushes whatever remains staged, then writes the fully-open interval
    /// onto every source that didn't end up in `failed_source_ids` (§4.E
    /// step 2, final graph write).
    async fn finish(mut self) -> Result<(Vec<String>, HashSet<String>, BTreeMap<VectorIndexKind, IndexUpgradeStats>), VersioningError> {
        for unit in self.per_index.values_mut() {
            if !unit.buffer.is_empty() {
                unit.apply(self.batch_size, self.max_attempts, &mut self.failed_source_ids).await?;
            }
        }

        for source_id in &self.source_ids {
            if self.failed_source_ids.contains(source_id) {
                continue;
            }
            let (query, params) =
                queries::set_versioning(self.graph.as_ref(), source_id, Some(TIMESTAMP_LOWER_BOUND), TIMESTAMP_UPPER_BOUND, None);
            self.graph
                .execute_query_with_retry(&query, params, GRAPH_RETRY_MAX_ATTEMPTS, Duration::from_secs(GRAPH_RETRY_MAX_WAIT_SECS))
                .await?;
        }

        let stats = self.per_index.into_iter().map(|(kind, unit)| (kind, unit.stats)).collect();
        Ok((self.source_ids, self.failed_source_ids, stats))
    }
}

mod upgrade_queries {
    use std::collections::HashSet;

    use bitemporal_core::backend::{ParamValue, QueryParams};

    const SENTINEL_PREDICATE: &str = "coalesce(s.valid_from, -1) = -1 AND coalesce(s.valid_to, -1) = -1";

    pub fn count_unversioned() -> (String, QueryParams) {
        let text = format!("MATCH (s:__Source__) WHERE {SENTINEL_PREDICATE} RETURN count(s) AS count");
        (text, QueryParams::new())
    }

    pub fn unversioned_source_ids(excluding: &HashSet<String>, limit: usize) -> (String, QueryParams) {
        let mut params = QueryParams::new();
        params.insert("excluded".to_string(), ParamValue::List(excluding.iter().cloned().collect()));
        params.insert("limit".to_string(), ParamValue::Int(limit as i64));
        let text = format!(
            "MATCH (s:__Source__) WHERE {SENTINEL_PREDICATE} AND NOT s.source_id IN $excluded \
             RETURN s.source_id AS id LIMIT $limit"
        );
        (text, params)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::{row, FakeGraphStore, FakeVectorIndex, FakeVectorStore};

    #[tokio::test(start_paused = true)]
    async fn upgrades_sources_and_tracks_failures_per_index() {
        let graph = Arc::new(FakeGraphStore::new());
        // Page 1: two unversioned sources. Page 2: none left, loop exits.
        graph.stub_sequence(
            "NOT s.source_id IN $excluded",
            vec![
                vec![row([("id", ParamValue::Str("s1".into()))]), row([("id", ParamValue::Str("s2".into()))])],
                vec![],
            ],
        );
        // stage_source is called once per source_id, in order: s1 then s2.
        graph.stub_sequence(
            "EXTRACTED_FROM]-(c:__Chunk__)",
            vec![
                vec![row([
                    ("source_id", ParamValue::Str("s1".into())),
                    ("node_ids", ParamValue::List(vec!["c1".into(), "c2".into()])),
                ])],
                vec![row([
                    ("source_id", ParamValue::Str("s2".into())),
                    ("node_ids", ParamValue::List(vec!["c-bad".into()])),
                ])],
            ],
        );

        let chunk_index = Arc::new(FakeVectorIndex::new(VectorIndexKind::Chunk));
        chunk_index.always_failing_ids.lock().unwrap().push("c-bad".to_string());
        let vectors = Arc::new(FakeVectorStore::new(vec![chunk_index.clone()]));

        let config = UpgradeConfig { batch_size: 10, max_attempts: 5, index_names: vec![VectorIndexKind::Chunk] };
        let upgrader = BulkUpgrader::new(graph.clone(), vectors, config);

        let stats = upgrader.upgrade_tenant(&TenantId::new("acme")).await.unwrap();

        let chunk_stats = &stats.per_index[&VectorIndexKind::Chunk];
        assert_eq!(chunk_stats.succeeded, 2);
        assert_eq!(chunk_stats.failed, 1);
        assert_eq!(stats.failed_source_ids, vec!["s2".to_string()]);

        let executed = graph.executed.lock().unwrap();
        let set_versioning_calls: Vec<_> =
            executed.iter().filter(|(query, _)| query.contains("SET") && query.contains("valid_from")).collect();
        assert_eq!(set_versioning_calls.len(), 1);
        assert_eq!(set_versioning_calls[0].1["source_id"], ParamValue::Str("s1".to_string()));
    }

    #[tokio::test]
    async fn count_unversioned_sources_reads_the_count_column() {
        let graph = Arc::new(FakeGraphStore::new());
        graph.stub("RETURN count(s) AS count", vec![row([("count", ParamValue::Int(42))])]);
        let vectors = Arc::new(FakeVectorStore::new(vec![]));
        let upgrader = BulkUpgrader::new(graph, vectors, UpgradeConfig::default());

        assert_eq!(upgrader.count_unversioned_sources().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn an_empty_first_page_upgrades_nothing() {
        let graph = Arc::new(FakeGraphStore::new());
        let vectors = Arc::new(FakeVectorStore::new(vec![Arc::new(FakeVectorIndex::new(VectorIndexKind::Chunk))]));
        let upgrader = BulkUpgrader::new(graph, vectors, UpgradeConfig::default());

        let stats = upgrader.upgrade_tenant(&TenantId::new("acme")).await.unwrap();
        assert!(stats.failed_source_ids.is_empty());
        assert!(stats.per_index.is_empty());
    }
}
