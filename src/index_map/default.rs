use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{info, warn};

use crate::config::{FeatureShardConfig, IndexingConfig};
use crate::errors::{IndexingError, configuration};
use crate::feature_key::intercept_key;
use crate::feature_sets::{FeatureRecordSource, NameAndTermFeatureSets};
use crate::index_map::FeatureIndexMap;
use crate::types::{FeatureIndex, FeatureKey, FeatureShardId};

/// Fully materialized index map.
///
/// Indices are dense (`0..len`) and follow ascending key order, so identical
/// inputs always produce identical assignments.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DefaultIndexMap {
    keys: Vec<FeatureKey>,
    indices: HashMap<FeatureKey, FeatureIndex>,
}

impl DefaultIndexMap {
    /// Build from any collection of keys; duplicates collapse.
    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = FeatureKey>,
    {
        let sorted: BTreeSet<FeatureKey> = keys.into_iter().collect();
        let keys: Vec<FeatureKey> = sorted.into_iter().collect();
        let indices = keys
            .iter()
            .enumerate()
            .map(|(index, key)| (key.clone(), index))
            .collect();
        Self { keys, indices }
    }

    /// Keys in index order.
    pub fn keys(&self) -> &[FeatureKey] {
        &self.keys
    }

    /// `(key, index)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureIndex)> {
        self.keys
            .iter()
            .enumerate()
            .map(|(index, key)| (key.as_str(), index))
    }

    /// Rebuild from keys already in index order.
    fn from_ordered_keys(keys: Vec<FeatureKey>) -> Result<Self, String> {
        let mut indices = HashMap::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            if indices.insert(key.clone(), index).is_some() {
                return Err(format!("duplicate feature key {key:?} at index {index}"));
            }
        }
        Ok(Self { keys, indices })
    }
}

impl fmt::Debug for DefaultIndexMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultIndexMap")
            .field("len", &self.keys.len())
            .finish()
    }
}

impl FeatureIndexMap for DefaultIndexMap {
    fn index_of(&self, key: &str) -> Option<FeatureIndex> {
        self.indices.get(key).copied()
    }

    fn feature_key_at(&self, index: FeatureIndex) -> Option<FeatureKey> {
        self.keys.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

// Only the ordered key list travels; the lookup table is rebuilt on arrival.
impl Serialize for DefaultIndexMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.keys.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DefaultIndexMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let keys = Vec::<FeatureKey>::deserialize(deserializer)?;
        Self::from_ordered_keys(keys).map_err(D::Error::custom)
    }
}

/// Loader carrying an in-memory map by value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DefaultIndexMapLoader {
    shard_id: FeatureShardId,
    map: Arc<DefaultIndexMap>,
}

impl DefaultIndexMapLoader {
    /// Wrap a built map.
    pub fn new(shard_id: impl Into<FeatureShardId>, map: DefaultIndexMap) -> Self {
        Self {
            shard_id: shard_id.into(),
            map: Arc::new(map),
        }
    }

    /// Shard this map belongs to.
    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    /// The realized map (already in memory).
    pub fn index_map(&self) -> Arc<DefaultIndexMap> {
        Arc::clone(&self.map)
    }
}

/// Builds in-memory index maps from feature sets.
pub struct DefaultIndexMapBuilder<'a> {
    feature_sets: &'a NameAndTermFeatureSets,
}

impl<'a> DefaultIndexMapBuilder<'a> {
    /// Builder over feature sets already read for every requested section.
    pub fn new(feature_sets: &'a NameAndTermFeatureSets) -> Self {
        Self { feature_sets }
    }

    /// Sorted, de-duplicated feature keys of one shard, intercept applied.
    pub fn shard_keys(
        &self,
        shard_id: &str,
        shard: &FeatureShardConfig,
    ) -> Result<BTreeSet<FeatureKey>, IndexingError> {
        let intercept = intercept_key();
        let mut keys: BTreeSet<FeatureKey> = BTreeSet::new();
        for section in &shard.section_keys {
            let features = self.feature_sets.section(section).ok_or_else(|| {
                configuration(format!(
                    "feature shard '{shard_id}' references section '{section}' which has no feature listing"
                ))
            })?;
            keys.extend(features.iter().map(|feature| feature.key()));
        }
        if shard.has_intercept() {
            keys.insert(intercept);
        } else if keys.remove(&intercept) {
            warn!(
                shard_id,
                "dropping raw intercept feature from shard with intercept disabled"
            );
        }
        Ok(keys)
    }

    /// Build the map for one shard.
    pub fn build_shard(
        &self,
        shard_id: &str,
        shard: &FeatureShardConfig,
    ) -> Result<DefaultIndexMap, IndexingError> {
        let map = DefaultIndexMap::from_keys(self.shard_keys(shard_id, shard)?);
        info!(
            shard_id,
            features = map.len(),
            intercept = shard.has_intercept(),
            "built in-memory index map"
        );
        Ok(map)
    }

    /// Read every configured section once and build all shards in parallel.
    pub fn build_all(
        config: &IndexingConfig,
        source: &dyn FeatureRecordSource,
    ) -> Result<Vec<DefaultIndexMapLoader>, IndexingError> {
        let feature_sets = source
            .read_sections(&config.all_section_keys())
            .map_err(|err| err.with_shard_context(|section| config.shards_for_section(section)))?;
        let builder = DefaultIndexMapBuilder::new(&feature_sets);
        config
            .feature_shards
            .par_iter()
            .map(|(shard_id, shard)| {
                builder
                    .build_shard(shard_id, shard)
                    .map(|map| DefaultIndexMapLoader::new(shard_id.clone(), map))
            })
            .collect()
    }
}
