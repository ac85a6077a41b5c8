//! Graph query construction (§6). Pure builders that turn domain intent into
//! query text and bound parameters, using `GraphStore::node_id` and
//! `GraphStore::property_assignment` for the pieces a concrete backend must
//! render itself. Nothing here executes a query — that's always the
//! caller's job via `GraphStore::execute_query[_with_retry]`.

use bitemporal_core::backend::{GraphStore, ParamValue, QueryParams};
use bitemporal_core::constants::{TIMESTAMP_LOWER_BOUND, TIMESTAMP_UPPER_BOUND};

/// The hop patterns a source's dependents are reached through (§6). `Fact`
/// is not named in §6's dependent-id list directly (facts hang off
/// statements, not the extraction chain) but the Bulk Upgrader's
/// `index_names` can include a fact index (§6 "Configuration surface"), so
/// its hop pattern extends the statement chain one more hop via `SUPPORTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependentArtifact {
    Chunk,
    Topic,
    Statement,
    Fact,
}

impl DependentArtifact {
    pub(crate) fn hop_pattern(self) -> &'static str {
        match self {
            DependentArtifact::Chunk => "(s:__Source__)<-[:EXTRACTED_FROM]-(c:__Chunk__)",
            DependentArtifact::Topic => "(s:__Source__)<-[:EXTRACTED_FROM]-()<-[:MENTIONED_IN]-(t:__Topic__)",
            DependentArtifact::Statement => {
                "(s:__Source__)<-[:EXTRACTED_FROM]-()<-[:MENTIONED_IN]-()<-[:BELONGS_TO]-(l:__Statement__)"
            }
            DependentArtifact::Fact => {
                "(s:__Source__)<-[:EXTRACTED_FROM]-()<-[:MENTIONED_IN]-()<-[:BELONGS_TO]-()<-[:SUPPORTS]-(x:__Fact__)"
            }
        }
    }

    pub(crate) fn return_expr(self) -> &'static str {
        match self {
            DependentArtifact::Chunk => "c.chunk_id",
            DependentArtifact::Topic => "t.topic_id",
            DependentArtifact::Statement => "l.statement_id",
            DependentArtifact::Fact => "x.fact_id",
        }
    }
}

/// Joins a node's identity field names into the canonical comma-separated
/// form stored in `version_independent_id_fields` (§6 "Set versioning").
pub fn format_id_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    fields.into_iter().collect::<Vec<_>>().join(",")
}

/// MATCH other `__Source__` nodes sharing `id_field_values`' identity,
/// excluding `exclude_source_id` itself, ordered by `valid_from` descending
/// (§4.C step 2, §6 "Find other source versions by identity").
pub fn find_other_versions(
    store: &dyn GraphStore,
    id_field_values: &[(String, ParamValue)],
    formatted_id_fields: &str,
    exclude_source_id: &str,
) -> (String, QueryParams) {
    let mut params = QueryParams::new();
    let mut clauses = Vec::with_capacity(id_field_values.len());
    for (i, (field, value)) in id_field_values.iter().enumerate() {
        let param_ref = format!("id_field_{i}");
        clauses.push(format!("s.{field} = ${param_ref}"));
        params.insert(param_ref, value.clone());
    }
    params.insert("formatted_id_fields".to_string(), ParamValue::Str(formatted_id_fields.to_string()));
    params.insert("exclude_source_id".to_string(), ParamValue::Str(exclude_source_id.to_string()));

    let identity_clause = if clauses.is_empty() { "true".to_string() } else { clauses.join(" AND ") };
    let source_id_expr = store.node_id("s.source_id");

    let text = format!(
        "MATCH (s:__Source__) WHERE {identity_clause} \
         AND coalesce(s.version_independent_id_fields, $formatted_id_fields) = $formatted_id_fields \
         AND {source_id_expr} <> $exclude_source_id \
         RETURN s.source_id AS source_id, coalesce(s.valid_from, {lower}) AS valid_from, \
                coalesce(s.valid_to, {upper}) AS valid_to \
         ORDER BY valid_from DESC",
        lower = TIMESTAMP_LOWER_BOUND,
        upper = TIMESTAMP_UPPER_BOUND,
    );
    (text, params)
}

/// Fetches dependent artifact ids for each of `source_ids`, grouped by
/// owning source (§6 "Get dependent ids").
pub fn dependent_ids(kind: DependentArtifact, source_ids: &[String]) -> (String, QueryParams) {
    let mut params = QueryParams::new();
    params.insert("source_ids".to_string(), ParamValue::List(source_ids.to_vec()));
    let text = format!(
        "MATCH {pattern} WHERE s.source_id IN $source_ids \
         RETURN s.source_id AS source_id, collect({ret}) AS node_ids",
        pattern = kind.hop_pattern(),
        ret = kind.return_expr(),
    );
    (text, params)
}

/// `SET s.valid_to = ... [, s.valid_from = ...] [, s.version_independent_id_fields = ...]`
/// on a single `__Source__` node (§4.C step 6, §6 "Set versioning").
///
/// `valid_from` is `None` for an adjustment write (only `valid_to` moves on
/// an already-placed source) and `Some` only where a caller needs to set
/// both fields at once.
pub fn set_versioning(
    store: &dyn GraphStore,
    source_id: &str,
    valid_from: Option<i64>,
    valid_to: i64,
    formatted_id_fields: Option<&str>,
) -> (String, QueryParams) {
    let mut params = QueryParams::new();
    params.insert("source_id".to_string(), ParamValue::Str(source_id.to_string()));
    params.insert("valid_to".to_string(), ParamValue::Int(valid_to));

    let mut assignments = vec![store.property_assignment("valid_to", "$valid_to")];
    if let Some(valid_from) = valid_from {
        params.insert("valid_from".to_string(), ParamValue::Int(valid_from));
        assignments.push(store.property_assignment("valid_from", "$valid_from"));
    }
    if let Some(formatted) = formatted_id_fields {
        params.insert("id_fields".to_string(), ParamValue::Str(formatted.to_string()));
        assignments.push(store.property_assignment("version_independent_id_fields", "$id_fields"));
    }

    let text = format!(
        "MATCH (s:__Source__) WHERE s.source_id = $source_id SET {}",
        assignments.join(", ")
    );
    (text, params)
}
