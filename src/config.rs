use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::date_range::DEFAULT_DATE_PATH_FORMAT;
use crate::constants::off_heap::DEFAULT_NUM_PARTITIONS;
use crate::errors::{IndexingError, configuration};
use crate::types::{FeatureShardId, SectionKey};

/// Per-shard feature configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureShardConfig {
    /// Section keys whose features belong to this shard.
    pub section_keys: BTreeSet<SectionKey>,
    /// Whether a synthetic intercept feature is added to the shard.
    ///
    /// `None` means "not stated" and resolves to `true`. Callers should set it
    /// explicitly; shards that disagree on intercept presence produce
    /// incompatible index spaces.
    #[serde(default)]
    pub intercept_enabled: Option<bool>,
}

impl FeatureShardConfig {
    /// Create a shard config from its section keys, leaving the intercept flag unstated.
    pub fn new<I, S>(section_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SectionKey>,
    {
        Self {
            section_keys: section_keys.into_iter().map(Into::into).collect(),
            intercept_enabled: None,
        }
    }

    /// Explicitly enable or disable the intercept feature.
    pub fn with_intercept(mut self, enabled: bool) -> Self {
        self.intercept_enabled = Some(enabled);
        self
    }

    /// Effective intercept flag (defaults to enabled).
    pub fn has_intercept(&self) -> bool {
        self.intercept_enabled.unwrap_or(true)
    }
}

/// Index-map configuration shared by every shard in a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingConfig {
    /// Directory of a pre-built off-heap store. When set, every shard uses it.
    #[serde(default)]
    pub off_heap_index_map_dir: Option<PathBuf>,
    /// Number of partitions each shard's off-heap store is split into.
    #[serde(default)]
    pub off_heap_index_map_num_partitions: Option<usize>,
    /// Shard id -> shard configuration.
    #[serde(default)]
    pub feature_shards: BTreeMap<FeatureShardId, FeatureShardConfig>,
}

impl IndexingConfig {
    /// Add (or replace) a shard.
    pub fn with_shard(mut self, shard_id: impl Into<FeatureShardId>, shard: FeatureShardConfig) -> Self {
        self.feature_shards.insert(shard_id.into(), shard);
        self
    }

    /// Use the off-heap backend rooted at `dir` for every shard.
    pub fn with_off_heap_dir(mut self, dir: impl Into<PathBuf>, num_partitions: usize) -> Self {
        self.off_heap_index_map_dir = Some(dir.into());
        self.off_heap_index_map_num_partitions = Some(num_partitions);
        self
    }

    /// Partition count, falling back to the single-partition default.
    pub fn num_partitions(&self) -> usize {
        self.off_heap_index_map_num_partitions
            .unwrap_or(DEFAULT_NUM_PARTITIONS)
    }

    /// Union of every shard's section keys.
    pub fn all_section_keys(&self) -> BTreeSet<SectionKey> {
        self.feature_shards
            .values()
            .flat_map(|shard| shard.section_keys.iter().cloned())
            .collect()
    }

    /// Shards that request `section`, in shard id order.
    pub fn shards_for_section(&self, section: &str) -> Vec<FeatureShardId> {
        self.feature_shards
            .iter()
            .filter(|(_, shard)| shard.section_keys.contains(section))
            .map(|(shard_id, _)| shard_id.clone())
            .collect()
    }

    /// Validate shard ids, section keys, and partition settings.
    pub fn validate(&self) -> Result<(), IndexingError> {
        if self.feature_shards.is_empty() {
            return Err(configuration("no feature shards configured"));
        }
        for (shard_id, shard) in &self.feature_shards {
            validate_shard_id(shard_id)?;
            if shard.section_keys.is_empty() {
                return Err(configuration(format!(
                    "feature shard '{shard_id}' has no section keys"
                )));
            }
            if shard.intercept_enabled.is_none() {
                debug!(
                    shard_id = %shard_id,
                    "intercept flag not set explicitly; defaulting to enabled"
                );
            }
        }
        if let Some(partitions) = self.off_heap_index_map_num_partitions
            && partitions == 0
        {
            return Err(configuration(
                "offHeapIndexMapNumPartitions must be greater than zero",
            ));
        }
        if self.off_heap_index_map_num_partitions.is_some() && self.off_heap_index_map_dir.is_none()
        {
            debug!("offHeapIndexMapNumPartitions is ignored without offHeapIndexMapDir");
        }
        Ok(())
    }

    /// Parse a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, IndexingError> {
        serde_json::from_str(raw)
            .map_err(|err| configuration(format!("invalid indexing config: {err}")))
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, IndexingError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Time-window selection for one logical input source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputWindowConfig {
    /// Explicit inclusive range, e.g. `2020-01-01:2020-01-03` or `20200101-20200103`.
    #[serde(default)]
    pub date_range: Option<String>,
    /// Range relative to today, e.g. `7:1` (seven days ago through yesterday).
    #[serde(default)]
    pub days_ago: Option<String>,
    /// chrono format for the per-date path segment appended to each base dir.
    #[serde(default = "default_date_path_format")]
    pub date_path_format: String,
    /// Fail instead of skipping when a dated directory does not exist.
    #[serde(default)]
    pub error_on_missing: bool,
}

impl Default for InputWindowConfig {
    fn default() -> Self {
        Self {
            date_range: None,
            days_ago: None,
            date_path_format: default_date_path_format(),
            error_on_missing: false,
        }
    }
}

impl InputWindowConfig {
    /// Select an explicit date range.
    pub fn with_date_range(mut self, spec: impl Into<String>) -> Self {
        self.date_range = Some(spec.into());
        self
    }

    /// Select a days-ago range.
    pub fn with_days_ago(mut self, spec: impl Into<String>) -> Self {
        self.days_ago = Some(spec.into());
        self
    }

    /// Override the per-date path segment format.
    pub fn with_date_path_format(mut self, format: impl Into<String>) -> Self {
        self.date_path_format = format.into();
        self
    }

    /// Fail on missing dated directories instead of skipping them.
    pub fn with_error_on_missing(mut self, error_on_missing: bool) -> Self {
        self.error_on_missing = error_on_missing;
        self
    }
}

fn default_date_path_format() -> String {
    DEFAULT_DATE_PATH_FORMAT.to_string()
}

/// Shard ids become directory names in the off-heap layout.
pub(crate) fn validate_shard_id(shard_id: &str) -> Result<(), IndexingError> {
    let valid = !shard_id.is_empty()
        && shard_id != "."
        && shard_id != ".."
        && shard_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(configuration(format!(
            "invalid feature shard id '{shard_id}': use ASCII letters, digits, '_', '-', or '.'"
        )))
    }
}
