//! Version Manager (§4.C) — the stream processor that resolves each
//! incoming source node's bitemporal interval, fans adjustments out to the
//! graph and every vector index, and stamps resolved intervals onto
//! downstream chunk/topic/statement nodes before yielding them onward.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use bitemporal_core::backend::{GraphRow, GraphStore, ParamValue, VectorStore};
use bitemporal_core::constants::{
    GRAPH_RETRY_MAX_ATTEMPTS, GRAPH_RETRY_MAX_WAIT_SECS, TIMESTAMP_LOWER_BOUND, TIMESTAMP_UPPER_BOUND,
    VECTOR_UPDATE_BATCH_SIZE, VECTOR_UPDATE_MAX_ATTEMPTS,
};
use bitemporal_core::error::{IndexError, VersioningError};
use bitemporal_core::metadata::StreamNode;
use bitemporal_core::models::{NodeKind, VectorIndexKind};
use futures03::{pin_mut, Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::interval::{place_interval, ExistingInterval, NewInterval};
use crate::queries::{self, DependentArtifact};
use crate::retry::retry_failed_ids;

/// `source_id → (valid_from, valid_to)`, threaded through one stream
/// invocation (§9 "Stream processing with memoization" — owned, not
/// process-global).
type IntervalMemo = HashMap<String, (i64, i64)>;

pub struct VersionManager {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
}

impl VersionManager {
    pub fn new(graph: Arc<dyn GraphStore>, vectors: Arc<dyn VectorStore>) -> Self {
        Self { graph, vectors }
    }

    /// Processes `nodes` in stream order, yielding each node back with its
    /// `valid_from`/`valid_to`/`previous_versions` stamped. A source node's
    /// adjustments (graph + vector writes) complete before it is yielded
    /// (§4.C "atomically-from-the-caller's-view").
    pub fn process_stream<'a>(
        &'a self,
        nodes: impl Stream<Item = StreamNode> + Send + 'a,
    ) -> impl Stream<Item = Result<StreamNode, VersioningError>> + Send + 'a {
        try_stream! {
            let mut memo: IntervalMemo = HashMap::new();
            pin_mut!(nodes);
            while let Some(mut node) = nodes.next().await {
                match node.kind {
                    NodeKind::Source => {
                        self.process_source(&mut node, &mut memo).await?;
                    }
                    NodeKind::Chunk | NodeKind::Topic | NodeKind::Statement => {
                        self.stamp_downstream(&mut node, &memo);
                    }
                }
                yield node;
            }
        }
    }

    async fn process_source(&self, node: &mut StreamNode, memo: &mut IntervalMemo) -> Result<(), VersioningError> {
        let Some(source_id) = node.source_id().map(str::to_string) else {
            warn!("source node missing source_id, passing through untouched");
            return Ok(());
        };
        let Some(valid_from) = node.resolved_valid_from() else {
            warn!(source_id, "source node missing valid_from/extract_timestamp, passing through untouched");
            return Ok(());
        };

        let id_fields = node.version_independent_id_fields();
        let formatted_id_fields = queries::format_id_fields(id_fields.iter().map(String::as_str));
        let id_field_values: Vec<(String, ParamValue)> = id_fields
            .iter()
            .filter_map(|field| node.identity_field_value(field).map(|value| (field.clone(), json_to_param(value))))
            .collect();

        // No identity fields means there is nothing to group this source
        // with — matching the Python reference's `if not
        // version_independent_id_fields: return []` guard, this must not
        // fall through to `find_other_versions`, whose `identity_clause`
        // would otherwise default to a vacuous `true` and match every other
        // identity-less source rather than "no existing versions".
        let existing: Vec<ExistingInterval> = if id_field_values.is_empty() {
            Vec::new()
        } else {
            let (query, params) = queries::find_other_versions(self.graph.as_ref(), &id_field_values, &formatted_id_fields, &source_id);
            let rows = self.graph.execute_query(&query, params).await?;
            rows.iter().map(row_to_existing).collect()
        };

        let (resolved, adjustments) =
            place_interval(NewInterval { source_id: source_id.clone(), valid_from }, &existing);

        node.set_versioning(resolved.valid_from, resolved.valid_to);
        node.set_prev_versions(adjustments.iter().map(|a| a.source_id.clone()).collect());
        memo.insert(source_id.clone(), (resolved.valid_from, resolved.valid_to));

        debug!(
            source_id,
            valid_from = resolved.valid_from,
            valid_to = resolved.valid_to,
            adjustments = adjustments.len(),
            "resolved source interval"
        );

        for adjustment in &adjustments {
            self.apply_adjustment(adjustment.source_id.as_str(), adjustment.valid_to, &formatted_id_fields).await?;
        }

        Ok(())
    }

    /// §4.C step 6: fans a single adjustment out to every non-dummy vector
    /// index, then writes it back to the graph.
    async fn apply_adjustment(
        &self,
        adjusted_source_id: &str,
        new_valid_to: i64,
        formatted_id_fields: &str,
    ) -> Result<(), VersioningError> {
        for index in self.vectors.all_indexes() {
            if index.is_dummy() {
                continue;
            }
            let kind = match index.index_name() {
                VectorIndexKind::Chunk => DependentArtifact::Chunk,
                VectorIndexKind::Topic => DependentArtifact::Topic,
                VectorIndexKind::Statement => DependentArtifact::Statement,
                // Facts hang off statements via SUPPORTS rather than
                // directly off the extraction chain, but `DependentArtifact`
                // already extends the hop pattern that one extra step (see
                // `queries::DependentArtifact::Fact`), the same mapping
                // `upgrade.rs::UnitOfWork::stage_source` uses for its own
                // per-index fan-out.
                VectorIndexKind::Fact => DependentArtifact::Fact,
            };

            let (query, params) = queries::dependent_ids(kind, std::slice::from_ref(&adjusted_source_id.to_string()));
            let rows = self.graph.execute_query(&query, params).await?;
            let node_ids: Vec<String> = rows.iter().flat_map(row_node_ids).collect();

            for batch in node_ids.chunks(VECTOR_UPDATE_BATCH_SIZE) {
                let batch = batch.to_vec();
                let outstanding = retry_failed_ids(batch, VECTOR_UPDATE_MAX_ATTEMPTS, |ids| {
                    let index = index.clone();
                    async move { index.update_versioning(new_valid_to, &ids).await }
                })
                .await?;
                if !outstanding.is_empty() {
                    Err(IndexError {
                        index: index.index_name(),
                        source_id: adjusted_source_id.to_string(),
                        failed_ids: outstanding,
                    })?;
                }
            }
        }

        let (query, params) =
            queries::set_versioning(self.graph.as_ref(), adjusted_source_id, None, new_valid_to, Some(formatted_id_fields));
        self.graph
            .execute_query_with_retry(&query, params, GRAPH_RETRY_MAX_ATTEMPTS, Duration::from_secs(GRAPH_RETRY_MAX_WAIT_SECS))
            .await?;

        Ok(())
    }

    fn stamp_downstream(&self, node: &mut StreamNode, memo: &IntervalMemo) {
        if let Some(&(valid_from, valid_to)) = node.source_id().and_then(|id| memo.get(id)) {
            node.set_versioning(valid_from, valid_to);
        }
    }
}

fn row_to_existing(row: &GraphRow) -> ExistingInterval {
    ExistingInterval {
        source_id: row.get("source_id").and_then(ParamValue::as_str).unwrap_or_default().to_string(),
        valid_from: row.get("valid_from").and_then(ParamValue::as_int).unwrap_or(TIMESTAMP_LOWER_BOUND),
        valid_to: row.get("valid_to").and_then(ParamValue::as_int).unwrap_or(TIMESTAMP_UPPER_BOUND),
    }
}

fn row_node_ids(row: &GraphRow) -> Vec<String> {
    row.get("node_ids").and_then(ParamValue::as_list).map(<[String]>::to_vec).unwrap_or_default()
}

fn json_to_param(value: &Value) -> ParamValue {
    match value {
        Value::String(s) => ParamValue::Str(s.clone()),
        Value::Number(n) if n.is_i64() => ParamValue::Int(n.as_i64().expect("checked is_i64")),
        other => ParamValue::Str(other.to_string()),
    }
}
