use tracing::info;

use crate::config::IndexingConfig;
use crate::errors::IndexingError;
use crate::feature_sets::FeatureRecordSource;
use crate::index_map::{
    DefaultIndexMapBuilder, IndexMapBackend, IndexMapLoader, IndexMapLoaders,
    OffHeapIndexMapLoader,
};

/// Backend a configuration selects for all of its shards.
pub fn selected_backend(config: &IndexingConfig) -> IndexMapBackend {
    if config.off_heap_index_map_dir.is_some() {
        IndexMapBackend::OffHeap
    } else {
        IndexMapBackend::InMemory
    }
}

/// Create one loader per configured shard, all on the same backend.
///
/// With an off-heap directory configured every shard gets an unopened
/// off-heap loader and `source` is never read. Otherwise every shard's map is
/// built in memory from `source`.
pub fn select_index_map_loaders(
    config: &IndexingConfig,
    source: &dyn FeatureRecordSource,
) -> Result<IndexMapLoaders, IndexingError> {
    config.validate()?;
    let backend = selected_backend(config);
    let loaders: IndexMapLoaders = match &config.off_heap_index_map_dir {
        Some(store_dir) => {
            let num_partitions = config.num_partitions();
            config
                .feature_shards
                .keys()
                .map(|shard_id| {
                    let loader =
                        OffHeapIndexMapLoader::new(store_dir.clone(), num_partitions, shard_id.clone());
                    (shard_id.clone(), IndexMapLoader::OffHeap(loader))
                })
                .collect()
        }
        None => DefaultIndexMapBuilder::build_all(config, source)?
            .into_iter()
            .map(|loader| (loader.shard_id().to_string(), IndexMapLoader::InMemory(loader)))
            .collect(),
    };
    info!(
        backend = %backend,
        shards = loaders.len(),
        "selected index map loaders"
    );
    Ok(loaders)
}
