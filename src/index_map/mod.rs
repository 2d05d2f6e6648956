//! Feature index maps and the loaders that realize them.
//!
//! A run picks one backend for every shard (see [`selector`]). The loader for
//! each shard is a cheap, serializable value; calling [`IndexMapLoader::open`]
//! on the consuming process yields the realized [`FeatureIndexMap`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::IndexingError;
use crate::feature_key::encode;
use crate::types::{FeatureIndex, FeatureKey, FeatureShardId};

/// In-memory backend.
pub mod default;
/// Off-heap, partitioned, memory-mapped backend.
pub mod off_heap;
/// Backend selection across shards.
pub mod selector;

pub use default::{DefaultIndexMap, DefaultIndexMapBuilder, DefaultIndexMapLoader};
pub use off_heap::{
    OffHeapIndexMap, OffHeapIndexMapLoader, OffHeapIndexMapWriter, OffHeapShardSummary,
};
pub use selector::select_index_map_loaders;

/// Read-only mapping from feature key to dense index.
pub trait FeatureIndexMap: Send + Sync {
    /// Index of an encoded feature key.
    fn index_of(&self, key: &str) -> Option<FeatureIndex>;

    /// Feature key stored at `index`.
    fn feature_key_at(&self, index: FeatureIndex) -> Option<FeatureKey>;

    /// Number of features in the map.
    fn len(&self) -> usize;

    /// True when the map holds no features.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of a raw (name, term) pair.
    fn index_of_feature(&self, name: &str, term: &str) -> Option<FeatureIndex> {
        self.index_of(&encode(name, term))
    }

    /// Convert raw `(name, term, value)` triples into a sparse vector.
    ///
    /// Unknown features are dropped; repeated features are summed. The
    /// result is ordered by index.
    fn project<'a, I>(&self, features: I) -> Vec<(FeatureIndex, f64)>
    where
        Self: Sized,
        I: IntoIterator<Item = (&'a str, &'a str, f64)>,
    {
        project_features(self, features)
    }
}

/// [`FeatureIndexMap::project`] for trait objects.
pub fn project_features<'a, M, I>(map: &M, features: I) -> Vec<(FeatureIndex, f64)>
where
    M: FeatureIndexMap + ?Sized,
    I: IntoIterator<Item = (&'a str, &'a str, f64)>,
{
    let mut merged: BTreeMap<FeatureIndex, f64> = BTreeMap::new();
    for (name, term, value) in features {
        if let Some(index) = map.index_of_feature(name, term) {
            *merged.entry(index).or_insert(0.0) += value;
        }
    }
    merged.into_iter().collect()
}

/// Which backend a loader realizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexMapBackend {
    /// Fully materialized map shipped as data.
    InMemory,
    /// Partitioned memory-mapped store opened locally.
    OffHeap,
}

impl fmt::Display for IndexMapBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexMapBackend::InMemory => f.write_str("in-memory"),
            IndexMapBackend::OffHeap => f.write_str("off-heap"),
        }
    }
}

/// Shippable handle that realizes one shard's index map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum IndexMapLoader {
    /// In-memory map carried by value.
    InMemory(DefaultIndexMapLoader),
    /// Reference to an off-heap store, opened lazily.
    OffHeap(OffHeapIndexMapLoader),
}

impl IndexMapLoader {
    /// Realize the map on this process.
    ///
    /// Off-heap loaders open their partitions on first call and reuse the
    /// handle afterwards.
    pub fn open(&self) -> Result<Arc<dyn FeatureIndexMap>, IndexingError> {
        match self {
            IndexMapLoader::InMemory(loader) => {
                Ok(loader.index_map() as Arc<dyn FeatureIndexMap>)
            }
            IndexMapLoader::OffHeap(loader) => Ok(loader.open()? as Arc<dyn FeatureIndexMap>),
        }
    }

    /// Backend this loader realizes.
    pub fn backend(&self) -> IndexMapBackend {
        match self {
            IndexMapLoader::InMemory(_) => IndexMapBackend::InMemory,
            IndexMapLoader::OffHeap(_) => IndexMapBackend::OffHeap,
        }
    }

    /// Shard this loader belongs to.
    pub fn shard_id(&self) -> &str {
        match self {
            IndexMapLoader::InMemory(loader) => loader.shard_id(),
            IndexMapLoader::OffHeap(loader) => loader.shard_id(),
        }
    }
}

/// Loaders for every shard of a run, keyed by shard id.
pub type IndexMapLoaders = BTreeMap<FeatureShardId, IndexMapLoader>;
