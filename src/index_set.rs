//! # Index Sets
//!
//! An index set is a named storage configuration. Two store-wide rules apply to index
//! sets and are enforced by the data store under a single write lock:
//!
//! - no two index sets may share an `index_prefix`
//! - exactly one writable index set carries the `default` flag once any writable index
//!   set exists
//!
//! Rotation and retention strategies are tagged unions selected by their `type`
//! discriminator, mirroring the class names the server uses.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ApiError, ApiRequest, HandlerResult, Logic, RequestBody, User, decode_body,
    validate_request_body,
};

/// Pattern every index prefix must match.
pub const INDEX_PREFIX_PATTERN: &str = "^[a-z0-9][a-z0-9_+-]*$";

/// Rotation strategy class that rotates after a number of messages.
pub const MESSAGE_COUNT_ROTATION_STRATEGY: &str =
    "org.graylog2.indexer.rotation.strategies.MessageCountRotationStrategy";
/// Retention strategy class that deletes the oldest indices.
pub const DELETION_RETENTION_STRATEGY: &str =
    "org.graylog2.indexer.retention.strategies.DeletionRetentionStrategy";

const INDEX_SET_REQUIRED_FIELDS: &[&str] = &[
    "title",
    "index_prefix",
    "rotation_strategy_class",
    "rotation_strategy",
    "retention_strategy_class",
    "retention_strategy",
    "creation_date",
    "index_analyzer",
    "shards",
    "index_optimization_max_num_segments",
];

const INDEX_SET_ALLOWED_FIELDS: &[&str] = &[
    "description",
    "replicas",
    "index_optimization_disabled",
    "writable",
    "default",
];

/////////////////////////////////////////////// Strategies ///////////////////////////////////////////////

/// When an index set starts a new index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RotationStrategy {
    /// Rotate after a number of documents.
    #[serde(rename = "org.graylog2.indexer.rotation.strategies.MessageCountRotationStrategyConfig")]
    MessageCount {
        /// Documents per index.
        max_docs_per_index: i64,
    },
    /// Rotate after the index reaches a size in bytes.
    #[serde(rename = "org.graylog2.indexer.rotation.strategies.SizeBasedRotationStrategyConfig")]
    SizeBased {
        /// Bytes per index.
        max_size: i64,
    },
    /// Rotate after an ISO 8601 period.
    #[serde(rename = "org.graylog2.indexer.rotation.strategies.TimeBasedRotationStrategyConfig")]
    TimeBased {
        /// The rotation period, e.g. `P1D`.
        rotation_period: String,
    },
}

/// What happens to indices beyond the retention limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RetentionStrategy {
    /// Delete old indices.
    #[serde(rename = "org.graylog2.indexer.retention.strategies.DeletionRetentionStrategyConfig")]
    Deletion {
        /// Indices kept.
        max_number_of_indices: i64,
    },
    /// Close old indices.
    #[serde(rename = "org.graylog2.indexer.retention.strategies.ClosingRetentionStrategyConfig")]
    Closing {
        /// Indices kept open.
        max_number_of_indices: i64,
    },
    /// Keep everything.
    #[serde(rename = "org.graylog2.indexer.retention.strategies.NoopRetentionStrategyConfig")]
    Noop {
        /// Indices kept.
        max_number_of_indices: i64,
    },
}

//////////////////////////////////////////////// IndexSet ////////////////////////////////////////////////

/// Which struct-level checks apply to an index set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// A new record: the identifier must not be set yet.
    Create,
    /// An existing record: the identifier must be present.
    Update,
}

/// A storage configuration for messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSet {
    /// Generated identifier; empty until the store assigns one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Display title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Prefix of every index in the set; unique across index sets.
    pub index_prefix: String,
    /// Rotation strategy class name.
    pub rotation_strategy_class: String,
    /// Rotation strategy configuration.
    pub rotation_strategy: RotationStrategy,
    /// Retention strategy class name.
    pub retention_strategy_class: String,
    /// Retention strategy configuration.
    pub retention_strategy: RetentionStrategy,
    /// Creation timestamp as sent by the client.
    pub creation_date: String,
    /// Elasticsearch analyzer.
    pub index_analyzer: String,
    /// Number of shards.
    pub shards: i32,
    /// Number of replicas.
    #[serde(default)]
    pub replicas: i32,
    /// Segments to optimize down to.
    pub index_optimization_max_num_segments: i32,
    /// Whether optimization is disabled.
    #[serde(default)]
    pub index_optimization_disabled: bool,
    /// Whether messages may be written into the set.
    #[serde(default = "default_writable")]
    pub writable: bool,
    /// Whether this is the default index set.
    #[serde(default)]
    pub default: bool,
}

fn default_writable() -> bool {
    true
}

static INDEX_PREFIX_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn index_prefix_regex() -> Result<&'static Regex, String> {
    match INDEX_PREFIX_REGEX.get_or_init(|| Regex::new(INDEX_PREFIX_PATTERN)) {
        Ok(pattern) => Ok(pattern),
        Err(e) => Err(e.to_string()),
    }
}

impl IndexSet {
    /// Runs struct-level validation for the given schema.
    pub fn validate(&self, schema: Schema) -> Result<(), String> {
        match schema {
            Schema::Create if !self.id.is_empty() => {
                return Err("id must not be set when creating an index set".to_string());
            }
            Schema::Update if self.id.is_empty() => {
                return Err("id is required".to_string());
            }
            _ => {}
        }
        let required = [
            ("title", &self.title),
            ("rotation_strategy_class", &self.rotation_strategy_class),
            ("retention_strategy_class", &self.retention_strategy_class),
            ("creation_date", &self.creation_date),
            ("index_analyzer", &self.index_analyzer),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(format!("{} is required", field));
        }
        if !index_prefix_regex()?.is_match(&self.index_prefix) {
            return Err(format!(
                "index_prefix {:?} must match {}",
                self.index_prefix, INDEX_PREFIX_PATTERN
            ));
        }
        if self.shards < 1 {
            return Err("shards must be at least 1".to_string());
        }
        if self.replicas < 0 {
            return Err("replicas must not be negative".to_string());
        }
        if self.index_optimization_max_num_segments < 1 {
            return Err("index_optimization_max_num_segments must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Size statistics of one index set, or the sum over all of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSetStats {
    /// Number of indices.
    pub indices: i64,
    /// Number of documents.
    pub documents: i64,
    /// Size in bytes.
    pub size: i64,
}

impl std::ops::Add for IndexSetStats {
    type Output = IndexSetStats;

    fn add(self, rhs: IndexSetStats) -> IndexSetStats {
        IndexSetStats {
            indices: self.indices.saturating_add(rhs.indices),
            documents: self.documents.saturating_add(rhs.documents),
            size: self.size.saturating_add(rhs.size),
        }
    }
}

/// Response body of the index set list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSetsBody {
    /// The index sets.
    pub index_sets: Vec<IndexSet>,
    /// Number of index sets.
    pub total: usize,
    /// Per index set statistics, present when requested with `stats=true`.
    #[serde(default)]
    pub stats: HashMap<String, IndexSetStats>,
}

//////////////////////////////////////////////// Handlers ////////////////////////////////////////////////

/// GET /system/indices/index_sets
pub async fn handle_get_index_sets(
    _user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<IndexSetsBody> {
    let with_stats = req.query_parse("stats", false)?;
    let (index_sets, total, stats) = lgc.get_index_sets(with_stats)?;
    Ok(Some(IndexSetsBody {
        index_sets,
        total,
        stats,
    }))
}

/// GET /system/indices/index_sets/{id}
pub async fn handle_get_index_set(
    _user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<IndexSet> {
    Ok(Some(lgc.get_index_set(req.param("index_set_id"))?))
}

/// POST /system/indices/index_sets
pub async fn handle_create_index_set(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<IndexSet> {
    lgc.authorize(user.as_ref(), "indexsets:create")?;
    let body = validate_request_body(
        &req.body,
        INDEX_SET_REQUIRED_FIELDS,
        INDEX_SET_ALLOWED_FIELDS,
        &[],
    )?;
    let index_set: IndexSet = decode_body(body)?;
    tracing::debug!(index_prefix = %index_set.index_prefix, "create index set");
    Ok(Some(lgc.add_index_set(index_set)?))
}

/// PUT /system/indices/index_sets/{id}
///
/// The body is merged over the stored record, so clients may send partial updates.
pub async fn handle_update_index_set(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<IndexSet> {
    lgc.authorize(user.as_ref(), "indexsets:edit")?;
    let id = req.param("index_set_id").to_string();
    let current = lgc.get_index_set(&id)?;

    let mut allowed: Vec<&str> = vec!["id"];
    allowed.extend_from_slice(INDEX_SET_REQUIRED_FIELDS);
    allowed.extend_from_slice(INDEX_SET_ALLOWED_FIELDS);
    let patch = validate_request_body(&req.body, &[], &allowed, &[])?;

    let mut index_set = merge_update(&current, patch)?;
    index_set.id = id;
    Ok(Some(lgc.update_index_set(index_set)?))
}

/// Merges an update body over a stored index set.
///
/// `default` is only set when the body names it; otherwise the store keeps its current
/// holder.
fn merge_update(current: &IndexSet, patch: RequestBody) -> Result<IndexSet, ApiError> {
    let requests_default = patch.contains_key("default");
    let mut merged = match serde_json::to_value(current) {
        Ok(Value::Object(map)) => map,
        _ => return Err(ApiError::internal("failed to encode the stored index set")),
    };
    merged.extend(patch);
    let mut index_set: IndexSet = decode_body(merged)?;
    if !requests_default {
        index_set.default = false;
    }
    Ok(index_set)
}

/// DELETE /system/indices/index_sets/{id}
pub async fn handle_delete_index_set(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<()> {
    lgc.authorize(user.as_ref(), "indexsets:delete")?;
    lgc.delete_index_set(req.param("index_set_id"))?;
    Ok(None)
}

/// PUT /system/indices/index_sets/{id}/default
pub async fn handle_set_default_index_set(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<IndexSet> {
    lgc.authorize(user.as_ref(), "indexsets:edit")?;
    Ok(Some(lgc.set_default_index_set(req.param("index_set_id"))?))
}

/// GET /system/indices/index_sets/{id}/stats
pub async fn handle_get_index_set_stats(
    _user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<IndexSetStats> {
    Ok(Some(lgc.get_index_set_stats(req.param("index_set_id"))?))
}

/// GET /system/indices/index_sets/stats
pub async fn handle_get_all_index_sets_stats(
    _user: Option<User>,
    lgc: Arc<Logic>,
    _req: ApiRequest,
) -> HandlerResult<IndexSetStats> {
    Ok(Some(lgc.get_all_index_sets_stats()?))
}
