//! Cascading Deletion Planner (§4.D) — discovers a source's dependents in
//! peel order (statements → topics → chunks → source), prunes facts and
//! entities orphaned along the way, and deletes everything from both the
//! graph and every vector index.

use std::sync::Arc;
use std::time::Duration;

use bitemporal_core::backend::{GraphRow, GraphStore, ParamValue, QueryParams, VectorStore};
use bitemporal_core::constants::{GRAPH_RETRY_MAX_ATTEMPTS, GRAPH_RETRY_MAX_WAIT_SECS};
use bitemporal_core::error::VersioningError;
use bitemporal_core::models::{DeleteSourcesConfig, DeletionStats, VectorIndexKind};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::queries::DependentArtifact;

pub struct DeletionPlanner {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    config: DeleteSourcesConfig,
}

impl DeletionPlanner {
    pub fn new(graph: Arc<dyn GraphStore>, vectors: Arc<dyn VectorStore>, config: DeleteSourcesConfig) -> Self {
        Self { graph, vectors, config }
    }

    /// Deletes everything reachable from `source_id` (§4.D per-source
    /// procedure), returning counts of what was removed.
    pub async fn delete_source_document(&self, source_id: &str) -> Result<DeletionStats, VersioningError> {
        let mut stats = DeletionStats::new(source_id);
        self.delete_statements_pass(source_id, &mut stats).await?;
        self.delete_topics_pass(source_id, &mut stats).await?;
        self.delete_chunks_pass(source_id, &mut stats).await?;
        self.delete_source_pass(source_id).await?;
        info!(source_id, ?stats, "source document deleted");
        Ok(stats)
    }

    /// Runs `delete_source_document` over `source_ids` with bounded
    /// concurrency (§5: worker pool sized by `num_workers`, default 10).
    /// Results are returned in completion order, not input order.
    pub async fn delete_source_documents(&self, source_ids: &[String]) -> Vec<Result<DeletionStats, VersioningError>> {
        let semaphore = Arc::new(Semaphore::new(self.config.num_workers.max(1)));
        let mut tasks = JoinSet::new();
        for source_id in source_ids.iter().cloned() {
            let semaphore = semaphore.clone();
            let graph = self.graph.clone();
            let vectors = self.vectors.clone();
            let config = self.config;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                DeletionPlanner { graph, vectors, config }.delete_source_document(&source_id).await
            });
        }

        let mut results = Vec::with_capacity(source_ids.len());
        while let Some(outcome) = tasks.join_next().await {
            results.push(outcome.expect("deletion task panicked"));
        }
        results
    }

    async fn delete_statements_pass(&self, source_id: &str, stats: &mut DeletionStats) -> Result<(), VersioningError> {
        loop {
            let (query, params) = deletion_queries::batch_artifact_ids(DependentArtifact::Statement, source_id, self.config.batch_size);
            let rows = self.graph.execute_query(&query, params).await?;
            let statement_ids = extract_ids(&rows);
            if statement_ids.is_empty() {
                break;
            }

            let (query, params) = deletion_queries::fact_ids_supporting(&statement_ids);
            let fact_ids = extract_ids(&self.graph.execute_query(&query, params).await?);

            self.delete_relationships_then_nodes("__Statement__", "statement_id", &statement_ids).await?;
            stats.statements += statement_ids.len();

            let (query, params) = deletion_queries::orphaned_facts(&fact_ids);
            let orphaned_facts = extract_ids(&self.graph.execute_query(&query, params).await?);

            if !orphaned_facts.is_empty() {
                let (query, params) = deletion_queries::entity_ids_for_facts(&orphaned_facts);
                let candidate_entities = extract_ids(&self.graph.execute_query(&query, params).await?);

                self.delete_relationships_then_nodes("__Fact__", "fact_id", &orphaned_facts).await?;
                stats.facts += orphaned_facts.len();

                let (query, params) = deletion_queries::orphaned_entities(&candidate_entities);
                let orphaned_entities = extract_ids(&self.graph.execute_query(&query, params).await?);
                if !orphaned_entities.is_empty() {
                    self.delete_relationships_then_nodes("__Entity__", "entity_id", &orphaned_entities).await?;
                    stats.entities += orphaned_entities.len();
                }
            }

            self.delete_embeddings(VectorIndexKind::Statement, &statement_ids).await;
        }
        Ok(())
    }

    async fn delete_topics_pass(&self, source_id: &str, stats: &mut DeletionStats) -> Result<(), VersioningError> {
        loop {
            let (query, params) = deletion_queries::batch_artifact_ids(DependentArtifact::Topic, source_id, self.config.batch_size);
            let topic_ids = extract_ids(&self.graph.execute_query(&query, params).await?);
            if topic_ids.is_empty() {
                break;
            }
            self.delete_relationships_then_nodes("__Topic__", "topic_id", &topic_ids).await?;
            stats.topics += topic_ids.len();
            self.delete_embeddings(VectorIndexKind::Topic, &topic_ids).await;
        }
        Ok(())
    }

    async fn delete_chunks_pass(&self, source_id: &str, stats: &mut DeletionStats) -> Result<(), VersioningError> {
        loop {
            let (query, params) = deletion_queries::batch_artifact_ids(DependentArtifact::Chunk, source_id, self.config.batch_size);
            let chunk_ids = extract_ids(&self.graph.execute_query(&query, params).await?);
            if chunk_ids.is_empty() {
                break;
            }
            self.delete_relationships_then_nodes("__Chunk__", "chunk_id", &chunk_ids).await?;
            stats.chunks += chunk_ids.len();
            self.delete_embeddings(VectorIndexKind::Chunk, &chunk_ids).await;
        }
        Ok(())
    }

    async fn delete_source_pass(&self, source_id: &str) -> Result<(), VersioningError> {
        self.delete_relationships_then_nodes("__Source__", "source_id", std::slice::from_ref(&source_id.to_string())).await
    }

    async fn delete_relationships_then_nodes(&self, label: &str, id_field: &str, ids: &[String]) -> Result<(), VersioningError> {
        if ids.is_empty() {
            return Ok(());
        }
        let (rel_query, rel_params) = deletion_queries::delete_relationships(label, id_field, ids);
        self.retried(&rel_query, rel_params).await?;
        let (node_query, node_params) = deletion_queries::delete_nodes(label, id_field, ids);
        self.retried(&node_query, node_params).await?;
        Ok(())
    }

    async fn retried(&self, query: &str, params: QueryParams) -> Result<Vec<GraphRow>, VersioningError> {
        Ok(self
            .graph
            .execute_query_with_retry(query, params, GRAPH_RETRY_MAX_ATTEMPTS, Duration::from_secs(GRAPH_RETRY_MAX_WAIT_SECS))
            .await?)
    }

    /// Fire-and-report: embedding deletion failures are logged, never
    /// surfaced, since the graph-side deletion already committed (§4.D
    /// "All embedding deletions are fire-and-report").
    async fn delete_embeddings(&self, kind: VectorIndexKind, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let Some(index) = self.vectors.index(kind) else { return };
        if index.is_dummy() {
            return;
        }
        if let Err(error) = index.delete_embeddings(ids).await {
            warn!(?kind, %error, "embedding deletion failed, continuing");
        }
    }
}

fn extract_ids(rows: &[GraphRow]) -> Vec<String> {
    rows.iter().filter_map(|row| row.get("id").and_then(ParamValue::as_str).map(str::to_string)).collect()
}

mod deletion_queries {
    use bitemporal_core::backend::{ParamValue, QueryParams};

    use crate::queries::DependentArtifact;

    pub fn batch_artifact_ids(kind: DependentArtifact, source_id: &str, limit: usize) -> (String, QueryParams) {
        let mut params = QueryParams::new();
        params.insert("source_id".to_string(), ParamValue::Str(source_id.to_string()));
        params.insert("limit".to_string(), ParamValue::Int(limit as i64));
        let text = format!(
            "MATCH {pattern} WHERE s.source_id = $source_id RETURN DISTINCT {ret} AS id LIMIT $limit",
            pattern = kind.hop_pattern(),
            ret = kind.return_expr(),
        );
        (text, params)
    }

    pub fn fact_ids_supporting(statement_ids: &[String]) -> (String, QueryParams) {
        let mut params = QueryParams::new();
        params.insert("statement_ids".to_string(), ParamValue::List(statement_ids.to_vec()));
        let text = "MATCH (f:__Fact__)-[:SUPPORTS]->(l:__Statement__) WHERE l.statement_id IN $statement_ids \
                     RETURN DISTINCT f.fact_id AS id"
            .to_string();
        (text, params)
    }

    pub fn orphaned_facts(fact_ids: &[String]) -> (String, QueryParams) {
        let mut params = QueryParams::new();
        params.insert("fact_ids".to_string(), ParamValue::List(fact_ids.to_vec()));
        let text = "MATCH (f:__Fact__) WHERE f.fact_id IN $fact_ids AND NOT (f)-[:SUPPORTS]->() RETURN f.fact_id AS id".to_string();
        (text, params)
    }

    pub fn entity_ids_for_facts(fact_ids: &[String]) -> (String, QueryParams) {
        let mut params = QueryParams::new();
        params.insert("fact_ids".to_string(), ParamValue::List(fact_ids.to_vec()));
        let text = "MATCH (e:__Entity__)-[:SUBJECT|OBJECT]->(f:__Fact__) WHERE f.fact_id IN $fact_ids \
                     RETURN DISTINCT e.entity_id AS id"
            .to_string();
        (text, params)
    }

    pub fn orphaned_entities(entity_ids: &[String]) -> (String, QueryParams) {
        let mut params = QueryParams::new();
        params.insert("entity_ids".to_string(), ParamValue::List(entity_ids.to_vec()));
        let text =
            "MATCH (e:__Entity__) WHERE e.entity_id IN $entity_ids AND NOT (e)-[:SUBJECT|OBJECT]->() RETURN e.entity_id AS id"
                .to_string();
        (text, params)
    }

    pub fn delete_relationships(label: &str, id_field: &str, ids: &[String]) -> (String, QueryParams) {
        let mut params = QueryParams::new();
        params.insert("ids".to_string(), ParamValue::List(ids.to_vec()));
        let text = format!("MATCH (n:{label})-[r]-() WHERE n.{id_field} IN $ids DELETE r");
        (text, params)
    }

    pub fn delete_nodes(label: &str, id_field: &str, ids: &[String]) -> (String, QueryParams) {
        let mut params = QueryParams::new();
        params.insert("ids".to_string(), ParamValue::List(ids.to_vec()));
        let text = format!("MATCH (n:{label}) WHERE n.{id_field} IN $ids DELETE n");
        (text, params)
    }
}
