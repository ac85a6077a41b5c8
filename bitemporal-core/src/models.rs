//! Domain types shared by every component: the stream-node discriminators,
//! the versioning configuration surface (§6), and the filter expression
//! tree used by both the versioning filter (§4.F) and backend `top_k` calls.

use std::collections::BTreeMap;
use std::fmt;

use crate::constants::TIMESTAMP_UPPER_BOUND;
use crate::error::ConfigError;

/// Discriminates a node in the indexing stream handed to the Version Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Source,
    Chunk,
    Topic,
    Statement,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Source => "source",
            NodeKind::Chunk => "chunk",
            NodeKind::Topic => "topic",
            NodeKind::Statement => "statement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "source" => Some(NodeKind::Source),
            "chunk" => Some(NodeKind::Chunk),
            "topic" => Some(NodeKind::Topic),
            "statement" => Some(NodeKind::Statement),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of vector indexes a `VectorStore` may expose, one per artifact type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VectorIndexKind {
    Chunk,
    Topic,
    Statement,
    Fact,
}

impl VectorIndexKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VectorIndexKind::Chunk => "chunk",
            VectorIndexKind::Topic => "topic",
            VectorIndexKind::Statement => "statement",
            VectorIndexKind::Fact => "fact",
        }
    }
}

impl fmt::Display for VectorIndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of bitemporal query intents (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersioningMode {
    NoVersioning,
    Current,
    Previous,
    AtTimestamp,
    BeforeTimestamp,
    OnOrAfterTimestamp,
}

impl VersioningMode {
    fn requires_timestamp(self) -> bool {
        matches!(
            self,
            VersioningMode::AtTimestamp
                | VersioningMode::BeforeTimestamp
                | VersioningMode::OnOrAfterTimestamp
        )
    }
}

/// A resolved `(mode, at_timestamp)` pair (§3).
///
/// Construction mirrors the four cases the original Python `VersioningConfig`
/// switches on, except that a mode which *requires* a timestamp (`AtTimestamp`,
/// `BeforeTimestamp`, `OnOrAfterTimestamp`) without one supplied is rejected
/// with `ConfigError` rather than silently defaulting to the upper bound —
/// see DESIGN.md for the rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersioningConfig {
    pub mode: VersioningMode,
    pub at_timestamp: i64,
}

impl VersioningConfig {
    pub fn new(mode: Option<VersioningMode>, at_timestamp: Option<i64>) -> Result<Self, ConfigError> {
        let resolved_mode = match (mode, at_timestamp) {
            (Some(m), _) => m,
            (None, Some(_)) => VersioningMode::AtTimestamp,
            (None, None) => VersioningMode::NoVersioning,
        };

        if resolved_mode.requires_timestamp() && at_timestamp.is_none() {
            return Err(ConfigError::MissingTimestamp { mode: resolved_mode });
        }

        Ok(Self { mode: resolved_mode, at_timestamp: at_timestamp.unwrap_or(TIMESTAMP_UPPER_BOUND) })
    }

    pub fn no_versioning() -> Self {
        Self { mode: VersioningMode::NoVersioning, at_timestamp: TIMESTAMP_UPPER_BOUND }
    }

    pub fn current() -> Self {
        Self { mode: VersioningMode::Current, at_timestamp: TIMESTAMP_UPPER_BOUND }
    }
}

/// Comparison used by a `FilterExpr::Predicate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// Boolean combinator for a `FilterExpr::Compound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterCondition {
    And,
    Or,
}

/// A metadata filter expression tree, mirroring the shape `top_k` filters and
/// the versioning predicate (§4.F) both use.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Predicate { key: String, value: FilterValue, operator: FilterOperator },
    Compound { filters: Vec<FilterExpr>, condition: FilterCondition },
}

/// Scalar value carried by a `FilterExpr::Predicate`.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Str(String),
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Str(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Str(v)
    }
}

/// A user-supplied (non-versioning) source filter, combined with the
/// versioning predicate by `VersioningConfig::apply` (§4.F).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterConfig {
    pub source_filters: Option<FilterExpr>,
}

impl FilterConfig {
    pub fn new(filter: FilterExpr) -> Self {
        Self { source_filters: Some(filter) }
    }

    pub fn empty() -> Self {
        Self { source_filters: None }
    }
}

/// Tenant qualifier. The core treats this as opaque and never rewrites labels
/// itself — that's left to the backend adapter (§6).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    pub const DEFAULT_TENANT_NAME: &'static str = "DEFAULT_TENANT";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn default_tenant() -> Self {
        Self(Self::DEFAULT_TENANT_NAME.to_string())
    }

    pub fn is_default_tenant(&self) -> bool {
        self.0 == Self::DEFAULT_TENANT_NAME
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration for `delete_source_document(s)` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteSourcesConfig {
    pub num_workers: usize,
    pub batch_size: usize,
}

impl Default for DeleteSourcesConfig {
    fn default() -> Self {
        Self {
            num_workers: crate::constants::DEFAULT_DELETE_NUM_WORKERS,
            batch_size: crate::constants::DEFAULT_DELETE_BATCH_SIZE,
        }
    }
}

/// Configuration for the bulk upgrader (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeConfig {
    pub batch_size: usize,
    pub max_attempts: u32,
    pub index_names: Vec<VectorIndexKind>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::constants::DEFAULT_UPGRADE_BATCH_SIZE,
            max_attempts: crate::constants::DEFAULT_UPGRADE_MAX_ATTEMPTS,
            index_names: vec![VectorIndexKind::Chunk, VectorIndexKind::Topic, VectorIndexKind::Statement],
        }
    }
}

/// Per-source deletion counts returned by `delete_source_document` (§4.D).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionStats {
    pub source_id: String,
    pub chunks: usize,
    pub topics: usize,
    pub statements: usize,
    pub facts: usize,
    pub entities: usize,
}

impl DeletionStats {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self { source_id: source_id.into(), ..Default::default() }
    }
}

/// Per-index success/failure counters accumulated by the bulk upgrader (§4.E).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexUpgradeStats {
    pub succeeded: usize,
    pub failed: usize,
}

/// Aggregate result of upgrading a single tenant (§4.E step 3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeStats {
    pub tenant_id: String,
    pub per_index: BTreeMap<VectorIndexKind, IndexUpgradeStats>,
    pub failed_source_ids: Vec<String>,
}
