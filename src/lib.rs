#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Command-line entry points shared by the bundled binary.
pub mod cli;
/// Shard and input-window configuration types.
pub mod config;
/// Centralized constants used across key encoding, stores, and date ranges.
pub mod constants;
/// Inclusive calendar date ranges.
pub mod date_range;
/// Canonical feature key encoding.
pub mod feature_key;
/// Raw feature sets and their readers.
pub mod feature_sets;
mod hash;
/// Feature index maps, loaders, and backend selection.
pub mod index_map;
/// Dated input path resolution.
pub mod input_paths;
/// Input transports used by readers and resolvers (filesystem today).
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use config::{FeatureShardConfig, IndexingConfig, InputWindowConfig};
pub use date_range::DateRange;
pub use errors::IndexingError;
pub use feature_key::NameAndTerm;
pub use feature_sets::{
    FeatureRecord, FeatureRecordSource, NameAndTermFeatureSets, TextFeatureSetReader,
};
pub use index_map::{
    DefaultIndexMap, DefaultIndexMapBuilder, FeatureIndexMap, IndexMapBackend, IndexMapLoader,
    IndexMapLoaders, OffHeapIndexMap, OffHeapIndexMapLoader, OffHeapIndexMapWriter,
    select_index_map_loaders,
};
pub use input_paths::InputPathResolver;
pub use transport::{FileSystem, LocalFileSystem};
pub use types::{
    FeatureIndex, FeatureKey, FeatureName, FeatureShardId, FeatureTerm, PathString, SectionKey,
};
