//! Domain types and backend contracts for the bitemporal versioning engine.
//!
//! This crate has no algorithms in it — see `bitemporal-engine` for the
//! interval algebra, Version Manager, Cascading Deletion Planner, Bulk
//! Upgrader, and versioning filter built on top of the traits defined here.

pub mod backend;
pub mod constants;
pub mod error;
pub mod metadata;
pub mod models;

pub use backend::{GraphRow, GraphStore, ParamValue, QueryParams, VectorHit, VectorIndex, VectorStore};
pub use error::{BackendError, ConfigError, IndexError, InputError, VersioningError};
pub use metadata::StreamNode;
pub use models::{
    DeleteSourcesConfig, DeletionStats, FilterCondition, FilterConfig, FilterExpr, FilterOperator, FilterValue,
    IndexUpgradeStats, NodeKind, TenantId, UpgradeConfig, UpgradeStats, VectorIndexKind, VersioningConfig,
    VersioningMode,
};
