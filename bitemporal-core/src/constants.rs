//! Wire-exact constants shared by every component.
//!
//! These values are part of the on-disk/on-wire contract with the graph and
//! vector backends; changing any of them is a breaking change for anyone
//! already running against a live store.

/// Inclusive lower sentinel for any `valid_from`/`valid_to` timestamp.
pub const TIMESTAMP_LOWER_BOUND: i64 = -1;

/// Exclusive upper sentinel. `valid_to == TIMESTAMP_UPPER_BOUND` means "current".
pub const TIMESTAMP_UPPER_BOUND: i64 = 10_000_000_000_000;

pub const VALID_FROM_KEY: &str = "__aws__versioning__valid_from__";
pub const VALID_TO_KEY: &str = "__aws__versioning__valid_to__";
pub const EXTRACT_TIMESTAMP_KEY: &str = "__aws__versioning__extract_timestamp__";
pub const BUILD_TIMESTAMP_KEY: &str = "__aws__versioning__build_timestamp__";
pub const ID_FIELDS_KEY: &str = "__aws__versioning__id_fields__";
pub const PREV_VERSIONS_KEY: &str = "__aws__versioning__prev_versions__";

/// Keys stripped from retrieval results by the metadata filter glue (§4.G).
pub const VERSIONING_METADATA_KEYS: &[&str] = &[
    VALID_FROM_KEY,
    VALID_TO_KEY,
    EXTRACT_TIMESTAMP_KEY,
    BUILD_TIMESTAMP_KEY,
    ID_FIELDS_KEY,
    PREV_VERSIONS_KEY,
];

/// Metadata key carrying the stream node discriminator (source/chunk/topic/statement).
pub const INDEX_KEY: &str = "__aws__graph__index__";

/// Batch size for `VectorIndex::update_versioning` calls.
pub const VECTOR_UPDATE_BATCH_SIZE: usize = 100;
/// Max retry attempts for a single `update_versioning` batch.
pub const VECTOR_UPDATE_MAX_ATTEMPTS: u32 = 5;

pub const DEFAULT_DELETE_NUM_WORKERS: usize = 10;
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 1000;

pub const DEFAULT_UPGRADE_BATCH_SIZE: usize = 100;
pub const DEFAULT_UPGRADE_MAX_ATTEMPTS: u32 = 5;
/// A per-index staging buffer is flushed once it reaches `batch_size * UPGRADE_FLUSH_MULTIPLIER`.
pub const UPGRADE_FLUSH_MULTIPLIER: usize = 10;

pub const GRAPH_RETRY_MAX_ATTEMPTS: u32 = 10;
pub const GRAPH_RETRY_MAX_WAIT_SECS: u64 = 7;
