use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use tracing::{debug, error, info, warn};

use crate::constants::off_heap::{
    BITCODE_PREFIX, INDEX_ENTRY_PREFIX, KEY_ENTRY_PREFIX, META_KEY, PARTITION_FILE_EXTENSION,
    PARTITION_FILE_PREFIX, STORE_VERSION, WRITE_BATCH,
};
use crate::config::validate_shard_id;
use crate::errors::{IndexingError, configuration};
use crate::feature_key::encode;
use crate::hash::partition_for_key;
use crate::index_map::FeatureIndexMap;
use crate::types::{FeatureIndex, FeatureKey, FeatureShardId};

/// Header record stored in every partition file.
#[derive(Clone, Debug, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
struct PartitionMeta {
    version: u8,
    shard_id: String,
    partition: u32,
    num_partitions: u32,
    count: u64,
}

/// Path of one partition file of a shard's store.
pub fn partition_path(store_dir: &Path, shard_id: &str, partition: usize) -> PathBuf {
    store_dir.join(shard_id).join(format!(
        "{PARTITION_FILE_PREFIX}{partition:05}.{PARTITION_FILE_EXTENSION}"
    ))
}

struct Partition {
    path: PathBuf,
    store: DataStore,
    base: u64,
    count: u64,
}

/// Index map served from memory-mapped partition files.
///
/// Keys are routed to a partition by a stable hash; each partition numbers
/// its keys locally and the global index adds the partition's base offset
/// (the entry count of all earlier partitions).
pub struct OffHeapIndexMap {
    shard_id: FeatureShardId,
    partitions: Vec<Partition>,
    len: usize,
}

impl fmt::Debug for OffHeapIndexMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffHeapIndexMap")
            .field("shard_id", &self.shard_id)
            .field("partitions", &self.partitions.len())
            .field("len", &self.len)
            .finish()
    }
}

impl OffHeapIndexMap {
    /// Open every partition of `shard_id` under `store_dir`.
    pub fn open(
        store_dir: &Path,
        num_partitions: usize,
        shard_id: &str,
    ) -> Result<Self, IndexingError> {
        if num_partitions == 0 {
            return Err(configuration("off-heap partition count must be greater than zero"));
        }
        validate_shard_id(shard_id)?;
        let mut partitions = Vec::with_capacity(num_partitions);
        let mut base = 0u64;
        for partition in 0..num_partitions {
            let path = partition_path(store_dir, shard_id, partition);
            if !path.is_file() {
                return Err(IndexingError::StoreNotFound { path });
            }
            let store = open_partition(&path)?;
            let meta = read_partition_meta(&store, &path)?;
            if meta.shard_id != shard_id || meta.partition as usize != partition {
                return Err(corrupt(
                    &path,
                    format!(
                        "partition header names shard '{}' partition {}",
                        meta.shard_id, meta.partition
                    ),
                ));
            }
            if meta.num_partitions as usize != num_partitions {
                return Err(configuration(format!(
                    "off-heap store for shard '{shard_id}' has {} partitions, configured {num_partitions}",
                    meta.num_partitions
                )));
            }
            let next_base = base
                .checked_add(meta.count)
                .ok_or_else(|| corrupt(&path, "entry count overflow"))?;
            partitions.push(Partition {
                path,
                store,
                base,
                count: meta.count,
            });
            base = next_base;
        }
        info!(
            shard_id,
            partitions = num_partitions,
            features = base,
            "opened off-heap index map"
        );
        Ok(Self {
            shard_id: shard_id.to_string(),
            partitions,
            len: base as usize,
        })
    }

    /// Shard this store belongs to.
    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    /// Number of partitions.
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Look up a key, surfacing store read and decode failures.
    pub fn try_index_of(&self, key: &str) -> Result<Option<FeatureIndex>, IndexingError> {
        let partition = &self.partitions[partition_for_key(key, self.partitions.len())];
        let entry = partition
            .store
            .read(&prefixed(KEY_ENTRY_PREFIX, key.as_bytes()))
            .map_err(|err| corrupt(&partition.path, err))?;
        let Some(entry) = entry else {
            return Ok(None);
        };
        let local = decode_local_index(entry.as_ref())
            .ok_or_else(|| corrupt(&partition.path, format!("malformed index for key {key:?}")))?;
        if local >= partition.count {
            return Err(corrupt(
                &partition.path,
                format!("local index {local} out of range for key {key:?}"),
            ));
        }
        Ok(Some((partition.base + local) as FeatureIndex))
    }

    /// Reverse lookup, surfacing store read and decode failures.
    pub fn try_feature_key_at(
        &self,
        index: FeatureIndex,
    ) -> Result<Option<FeatureKey>, IndexingError> {
        let index = index as u64;
        let slot = self
            .partitions
            .partition_point(|partition| partition.base + partition.count <= index);
        let Some(partition) = self.partitions.get(slot) else {
            return Ok(None);
        };
        let local = index - partition.base;
        let entry = partition
            .store
            .read(&prefixed(INDEX_ENTRY_PREFIX, &local.to_le_bytes()))
            .map_err(|err| corrupt(&partition.path, err))?
            .ok_or_else(|| corrupt(&partition.path, format!("missing key for local index {local}")))?;
        String::from_utf8(entry.as_ref().to_vec())
            .map(Some)
            .map_err(|err| corrupt(&partition.path, err))
    }

    /// Fallible [`FeatureIndexMap::project`]: the first store failure aborts.
    pub fn try_project<'a, I>(
        &self,
        features: I,
    ) -> Result<Vec<(FeatureIndex, f64)>, IndexingError>
    where
        I: IntoIterator<Item = (&'a str, &'a str, f64)>,
    {
        let mut merged: BTreeMap<FeatureIndex, f64> = BTreeMap::new();
        for (name, term, value) in features {
            if let Some(index) = self.try_index_of(&encode(name, term))? {
                *merged.entry(index).or_insert(0.0) += value;
            }
        }
        Ok(merged.into_iter().collect())
    }
}

impl FeatureIndexMap for OffHeapIndexMap {
    fn index_of(&self, key: &str) -> Option<FeatureIndex> {
        match self.try_index_of(key) {
            Ok(index) => index,
            Err(err) => {
                error!(shard_id = %self.shard_id, error = %err, "off-heap lookup failed");
                None
            }
        }
    }

    fn feature_key_at(&self, index: FeatureIndex) -> Option<FeatureKey> {
        match self.try_feature_key_at(index) {
            Ok(key) => key,
            Err(err) => {
                error!(shard_id = %self.shard_id, error = %err, "off-heap reverse lookup failed");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Reference to a shard's off-heap store.
///
/// Serializes as the store location only. The first `open` on a process maps
/// the partitions; later calls (and clones of the loader) reuse that handle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OffHeapIndexMapLoader {
    store_dir: PathBuf,
    num_partitions: usize,
    shard_id: FeatureShardId,
    #[serde(skip)]
    opened: Arc<Mutex<Option<Arc<OffHeapIndexMap>>>>,
}

impl OffHeapIndexMapLoader {
    /// Loader for `shard_id` in `store_dir`; nothing is opened yet.
    pub fn new(
        store_dir: impl Into<PathBuf>,
        num_partitions: usize,
        shard_id: impl Into<FeatureShardId>,
    ) -> Self {
        Self {
            store_dir: store_dir.into(),
            num_partitions,
            shard_id: shard_id.into(),
            opened: Arc::default(),
        }
    }

    /// Shard this loader opens.
    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    /// Store root directory.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// True once this process has opened the store.
    pub fn is_open(&self) -> bool {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Open the store, or return the handle opened earlier.
    pub fn open(&self) -> Result<Arc<OffHeapIndexMap>, IndexingError> {
        let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(map) = opened.as_ref() {
            return Ok(Arc::clone(map));
        }
        let map = Arc::new(OffHeapIndexMap::open(
            &self.store_dir,
            self.num_partitions,
            &self.shard_id,
        )?);
        *opened = Some(Arc::clone(&map));
        Ok(map)
    }
}

/// Per-shard outcome of [`OffHeapIndexMapWriter::write_shard`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffHeapShardSummary {
    /// Shard written.
    pub shard_id: FeatureShardId,
    /// Entry count per partition, in partition order.
    pub partition_counts: Vec<u64>,
}

impl OffHeapShardSummary {
    /// Total features across partitions.
    pub fn total(&self) -> u64 {
        self.partition_counts.iter().sum()
    }
}

/// Builds the partitioned store read by [`OffHeapIndexMap`].
#[derive(Clone, Debug)]
pub struct OffHeapIndexMapWriter {
    store_dir: PathBuf,
    num_partitions: usize,
}

impl OffHeapIndexMapWriter {
    /// Writer targeting `store_dir` with `num_partitions` partitions per shard.
    pub fn new(store_dir: impl Into<PathBuf>, num_partitions: usize) -> Self {
        Self {
            store_dir: store_dir.into(),
            num_partitions,
        }
    }

    /// Write every partition of `shard_id`.
    ///
    /// Keys are de-duplicated; within a partition local indices follow
    /// ascending key order. Existing partition files are never overwritten.
    pub fn write_shard<I>(
        &self,
        shard_id: &str,
        keys: I,
    ) -> Result<OffHeapShardSummary, IndexingError>
    where
        I: IntoIterator<Item = FeatureKey>,
    {
        if self.num_partitions == 0 {
            return Err(configuration("off-heap partition count must be greater than zero"));
        }
        validate_shard_id(shard_id)?;
        let keys: BTreeSet<FeatureKey> = keys.into_iter().collect();
        let mut buckets: Vec<Vec<&FeatureKey>> = vec![Vec::new(); self.num_partitions];
        for key in &keys {
            buckets[partition_for_key(key, self.num_partitions)].push(key);
        }
        for partition in 0..self.num_partitions {
            let path = partition_path(&self.store_dir, shard_id, partition);
            if path.exists() {
                return Err(configuration(format!(
                    "refusing to overwrite existing off-heap partition {}",
                    path.display()
                )));
            }
        }
        let mut partition_counts = Vec::with_capacity(self.num_partitions);
        for (partition, bucket) in buckets.iter().enumerate() {
            let path = partition_path(&self.store_dir, shard_id, partition);
            if let Err(err) = self.write_partition(shard_id, partition, &path, bucket) {
                self.remove_partitions(shard_id, partition);
                return Err(err);
            }
            partition_counts.push(bucket.len() as u64);
        }
        let summary = OffHeapShardSummary {
            shard_id: shard_id.to_string(),
            partition_counts,
        };
        info!(
            shard_id,
            partitions = self.num_partitions,
            features = summary.total(),
            "wrote off-heap index store"
        );
        Ok(summary)
    }

    /// Delete partitions `0..=last` of a shard whose write failed, so the
    /// shard can be rewritten.
    fn remove_partitions(&self, shard_id: &str, last: usize) {
        for partition in 0..=last {
            let path = partition_path(&self.store_dir, shard_id, partition);
            let is_file = fs::symlink_metadata(&path)
                .map(|meta| meta.file_type().is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Err(err) = fs::remove_file(&path) {
                warn!(
                    shard_id,
                    path = %path.display(),
                    error = %err,
                    "failed to remove partially written partition"
                );
            }
        }
    }

    fn write_partition(
        &self,
        shard_id: &str,
        partition: usize,
        path: &Path,
        keys: &[&FeatureKey],
    ) -> Result<(), IndexingError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let store = DataStore::open(path)?;
        for (chunk_idx, chunk) in keys.chunks(WRITE_BATCH).enumerate() {
            let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(chunk.len() * 2);
            for (offset, key) in chunk.iter().enumerate() {
                let local = (chunk_idx * WRITE_BATCH + offset) as u64;
                entries.push((
                    prefixed(KEY_ENTRY_PREFIX, key.as_bytes()),
                    local.to_le_bytes().to_vec(),
                ));
                entries.push((
                    prefixed(INDEX_ENTRY_PREFIX, &local.to_le_bytes()),
                    key.as_bytes().to_vec(),
                ));
            }
            let entry_refs: Vec<(&[u8], &[u8])> = entries
                .iter()
                .map(|(key, value)| (key.as_slice(), value.as_slice()))
                .collect();
            store.batch_write(&entry_refs)?;
        }
        // The header goes last so a partially written partition fails to open.
        let meta = PartitionMeta {
            version: STORE_VERSION,
            shard_id: shard_id.to_string(),
            partition: partition as u32,
            num_partitions: self.num_partitions as u32,
            count: keys.len() as u64,
        };
        store.write(META_KEY, &encode_partition_meta(&meta))?;
        debug!(
            shard_id,
            partition,
            entries = keys.len(),
            path = %path.display(),
            "wrote off-heap partition"
        );
        Ok(())
    }
}

/// Open an existing partition file.
///
/// `DataStore::open` cuts an undecodable tail off the file; a partition that
/// shrinks while opening is reported as corrupt instead of served.
fn open_partition(path: &Path) -> Result<DataStore, IndexingError> {
    let len_before = fs::metadata(path)?.len();
    let store = DataStore::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => corrupt(path, err),
        _ => IndexingError::Io(err),
    })?;
    let len_after = fs::metadata(path)?.len();
    if len_after < len_before {
        return Err(corrupt(
            path,
            format!("trailing data truncated on open ({len_before} -> {len_after} bytes)"),
        ));
    }
    Ok(store)
}

fn read_partition_meta(store: &DataStore, path: &Path) -> Result<PartitionMeta, IndexingError> {
    let entry = store
        .read(META_KEY)
        .map_err(|err| corrupt(path, err))?
        .ok_or_else(|| corrupt(path, "missing partition header"))?;
    let meta = decode_partition_meta(entry.as_ref()).map_err(|reason| corrupt(path, reason))?;
    if meta.version != STORE_VERSION {
        return Err(corrupt(
            path,
            format!(
                "partition version mismatch (expected {STORE_VERSION}, found {})",
                meta.version
            ),
        ));
    }
    Ok(meta)
}

fn encode_partition_meta(meta: &PartitionMeta) -> Vec<u8> {
    let payload = bitcode::encode(meta);
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(&payload);
    out
}

fn decode_partition_meta(bytes: &[u8]) -> Result<PartitionMeta, String> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err("partition header missing expected prefix".to_string());
    }
    bitcode::decode(&bytes[1..]).map_err(|err| format!("failed to decode partition header: {err}"))
}

fn decode_local_index(bytes: &[u8]) -> Option<u64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}

fn prefixed(prefix: &[u8], body: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + body.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(body);
    key
}

fn corrupt(path: &Path, reason: impl fmt::Display) -> IndexingError {
    IndexingError::CorruptStore {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_map::DefaultIndexMap;
    use std::thread;
    use tempfile::tempdir;

    fn sample_keys() -> Vec<FeatureKey> {
        (0..50)
            .map(|idx| encode(&format!("feature_{idx}"), &format!("term_{}", idx % 7)))
            .collect()
    }

    #[test]
    fn partition_paths_are_per_shard() {
        let path = partition_path(Path::new("/stores"), "global", 3);
        assert_eq!(path, PathBuf::from("/stores/global/partition-00003.bin"));
    }

    #[test]
    fn written_store_round_trips_every_key_densely() {
        let temp = tempdir().unwrap();
        let summary = OffHeapIndexMapWriter::new(temp.path(), 4)
            .write_shard("global", sample_keys())
            .unwrap();
        assert_eq!(summary.partition_counts.len(), 4);
        assert_eq!(summary.total(), 50);

        let map = OffHeapIndexMap::open(temp.path(), 4, "global").unwrap();
        assert_eq!(map.len(), 50);
        assert_eq!(map.num_partitions(), 4);

        let mut seen = BTreeSet::new();
        for key in sample_keys() {
            let index = map.index_of(&key).unwrap();
            assert!(index < 50);
            assert!(seen.insert(index), "index {index} assigned twice");
            assert_eq!(map.feature_key_at(index), Some(key));
        }
        assert_eq!(seen.len(), 50);
        assert_eq!(map.index_of(&encode("unknown", "")), None);
        assert_eq!(map.feature_key_at(50), None);
    }

    #[test]
    fn single_partition_matches_in_memory_assignment() {
        let temp = tempdir().unwrap();
        OffHeapIndexMapWriter::new(temp.path(), 1)
            .write_shard("global", sample_keys())
            .unwrap();
        let off_heap = OffHeapIndexMap::open(temp.path(), 1, "global").unwrap();
        let in_memory = DefaultIndexMap::from_keys(sample_keys());
        for (key, index) in in_memory.iter() {
            assert_eq!(off_heap.index_of(key), Some(index));
        }
    }

    #[test]
    fn empty_shard_opens_with_no_features() {
        let temp = tempdir().unwrap();
        OffHeapIndexMapWriter::new(temp.path(), 2)
            .write_shard("empty", Vec::new())
            .unwrap();
        let map = OffHeapIndexMap::open(temp.path(), 2, "empty").unwrap();
        assert!(map.is_empty());
        assert_eq!(map.index_of("anything"), None);
        assert_eq!(map.feature_key_at(0), None);
    }

    #[test]
    fn missing_partition_is_store_not_found() {
        let temp = tempdir().unwrap();
        OffHeapIndexMapWriter::new(temp.path(), 2)
            .write_shard("global", sample_keys())
            .unwrap();
        fs::remove_file(partition_path(temp.path(), "global", 1)).unwrap();

        let err = OffHeapIndexMap::open(temp.path(), 2, "global").unwrap_err();
        assert!(matches!(err, IndexingError::StoreNotFound { .. }));

        let err = OffHeapIndexMap::open(temp.path(), 2, "other_shard").unwrap_err();
        assert!(matches!(err, IndexingError::StoreNotFound { .. }));
    }

    #[test]
    fn bad_header_is_corrupt_store() {
        let temp = tempdir().unwrap();
        OffHeapIndexMapWriter::new(temp.path(), 1)
            .write_shard("global", sample_keys())
            .unwrap();
        let path = partition_path(temp.path(), "global", 0);
        {
            let store = DataStore::open(path.as_path()).unwrap();
            store.write(META_KEY, b"garbage").unwrap();
        }
        let err = OffHeapIndexMap::open(temp.path(), 1, "global").unwrap_err();
        assert!(matches!(err, IndexingError::CorruptStore { .. }));

        {
            let store = DataStore::open(path.as_path()).unwrap();
            let stale = encode_partition_meta(&PartitionMeta {
                version: STORE_VERSION + 1,
                shard_id: "global".to_string(),
                partition: 0,
                num_partitions: 1,
                count: 50,
            });
            store.write(META_KEY, &stale).unwrap();
        }
        let err = OffHeapIndexMap::open(temp.path(), 1, "global").unwrap_err();
        assert!(matches!(err, IndexingError::CorruptStore { reason, .. } if reason.contains("version")));
    }

    #[test]
    fn missing_header_is_corrupt_store() {
        let temp = tempdir().unwrap();
        let path = partition_path(temp.path(), "global", 0);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        {
            let store = DataStore::open(path.as_path()).unwrap();
            store.write(b"k:orphan", &0u64.to_le_bytes()).unwrap();
        }
        let err = OffHeapIndexMap::open(temp.path(), 1, "global").unwrap_err();
        assert!(matches!(err, IndexingError::CorruptStore { reason, .. } if reason.contains("header")));
    }

    #[test]
    fn malformed_entry_surfaces_corruption_on_lookup() {
        let temp = tempdir().unwrap();
        let key = encode("age", "30");
        OffHeapIndexMapWriter::new(temp.path(), 1)
            .write_shard("global", [key.clone()])
            .unwrap();
        {
            let store = DataStore::open(partition_path(temp.path(), "global", 0).as_path()).unwrap();
            store
                .write(&prefixed(KEY_ENTRY_PREFIX, key.as_bytes()), b"abc")
                .unwrap();
        }
        let map = OffHeapIndexMap::open(temp.path(), 1, "global").unwrap();
        assert!(matches!(
            map.try_index_of(&key),
            Err(IndexingError::CorruptStore { .. })
        ));
        assert_eq!(map.index_of(&key), None);
    }

    #[test]
    fn try_project_aborts_on_corrupt_entry() {
        let temp = tempdir().unwrap();
        let key = encode("age", "30");
        OffHeapIndexMapWriter::new(temp.path(), 1)
            .write_shard("global", [key.clone(), encode("country", "us")])
            .unwrap();
        let map = OffHeapIndexMap::open(temp.path(), 1, "global").unwrap();
        assert_eq!(
            map.try_project([("country", "us", 2.0), ("unknown", "x", 1.0)])
                .unwrap()
                .len(),
            1
        );
        drop(map);
        {
            let store = DataStore::open(partition_path(temp.path(), "global", 0).as_path()).unwrap();
            store
                .write(&prefixed(KEY_ENTRY_PREFIX, key.as_bytes()), b"abc")
                .unwrap();
        }
        let map = OffHeapIndexMap::open(temp.path(), 1, "global").unwrap();
        let err = map
            .try_project([("country", "us", 1.0), ("age", "30", 1.0)])
            .unwrap_err();
        assert!(matches!(err, IndexingError::CorruptStore { .. }));
    }

    #[test]
    fn damaged_tail_is_corrupt_store() {
        let temp = tempdir().unwrap();
        OffHeapIndexMapWriter::new(temp.path(), 1)
            .write_shard("global", sample_keys().into_iter().take(20))
            .unwrap();
        let path = partition_path(temp.path(), "global", 0);
        {
            let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
            std::io::Write::write_all(&mut file, &[0xAB; 37]).unwrap();
        }
        let err = OffHeapIndexMap::open(temp.path(), 1, "global").unwrap_err();
        assert!(matches!(err, IndexingError::CorruptStore { .. }));
    }

    #[test]
    fn overflowing_entry_counts_are_corrupt_store() {
        let temp = tempdir().unwrap();
        OffHeapIndexMapWriter::new(temp.path(), 2)
            .write_shard("global", sample_keys())
            .unwrap();
        for partition in 0..2 {
            let store =
                DataStore::open(partition_path(temp.path(), "global", partition).as_path()).unwrap();
            let meta = encode_partition_meta(&PartitionMeta {
                version: STORE_VERSION,
                shard_id: "global".to_string(),
                partition: partition as u32,
                num_partitions: 2,
                count: u64::MAX,
            });
            store.write(META_KEY, &meta).unwrap();
        }
        let err = OffHeapIndexMap::open(temp.path(), 2, "global").unwrap_err();
        assert!(matches!(err, IndexingError::CorruptStore { reason, .. } if reason.contains("overflow")));
    }

    #[test]
    fn unsafe_shard_ids_are_rejected() {
        let temp = tempdir().unwrap();
        let writer = OffHeapIndexMapWriter::new(temp.path().join("store"), 1);
        for shard_id in ["../escape", "", ".."] {
            assert!(err_is_configuration(
                &writer.write_shard(shard_id, sample_keys()).unwrap_err()
            ));
            assert!(err_is_configuration(
                &OffHeapIndexMap::open(&temp.path().join("store"), 1, shard_id).unwrap_err()
            ));
            assert!(err_is_configuration(
                &OffHeapIndexMapLoader::new(temp.path().join("store"), 1, shard_id)
                    .open()
                    .unwrap_err()
            ));
        }
        assert!(!temp.path().join("escape").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failed_write_removes_earlier_partitions() {
        let temp = tempdir().unwrap();
        let writer = OffHeapIndexMapWriter::new(temp.path(), 2);
        let blocked = partition_path(temp.path(), "global", 1);
        fs::create_dir_all(blocked.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(temp.path().join("missing").join("target.bin"), &blocked)
            .unwrap();

        assert!(writer.write_shard("global", sample_keys()).is_err());
        assert!(!partition_path(temp.path(), "global", 0).exists());

        fs::remove_file(&blocked).unwrap();
        let summary = writer.write_shard("global", sample_keys()).unwrap();
        assert_eq!(summary.total(), 50);
    }

    #[test]
    fn partition_count_mismatch_is_configuration_error() {
        let temp = tempdir().unwrap();
        OffHeapIndexMapWriter::new(temp.path(), 1)
            .write_shard("global", sample_keys())
            .unwrap();
        let path = partition_path(temp.path(), "global", 0);
        {
            let store = DataStore::open(path.as_path()).unwrap();
            let meta = encode_partition_meta(&PartitionMeta {
                version: STORE_VERSION,
                shard_id: "global".to_string(),
                partition: 0,
                num_partitions: 3,
                count: 50,
            });
            store.write(META_KEY, &meta).unwrap();
        }
        let err = OffHeapIndexMap::open(temp.path(), 1, "global").unwrap_err();
        assert!(err_is_configuration(&err));
        assert!(OffHeapIndexMap::open(temp.path(), 0, "global").is_err());
    }

    #[test]
    fn writer_refuses_to_overwrite() {
        let temp = tempdir().unwrap();
        let writer = OffHeapIndexMapWriter::new(temp.path(), 2);
        writer.write_shard("global", sample_keys()).unwrap();
        let err = writer.write_shard("global", sample_keys()).unwrap_err();
        assert!(err_is_configuration(&err));
    }

    #[test]
    fn loader_opens_once_across_threads() {
        let temp = tempdir().unwrap();
        OffHeapIndexMapWriter::new(temp.path(), 3)
            .write_shard("global", sample_keys())
            .unwrap();
        let loader = OffHeapIndexMapLoader::new(temp.path(), 3, "global");
        assert!(!loader.is_open());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let loader = loader.clone();
                thread::spawn(move || loader.open().unwrap())
            })
            .collect();
        let maps: Vec<Arc<OffHeapIndexMap>> =
            handles.into_iter().map(|handle| handle.join().unwrap()).collect();
        assert!(loader.is_open());
        for map in &maps[1..] {
            assert!(Arc::ptr_eq(&maps[0], map));
        }
        assert!(Arc::ptr_eq(&maps[0], &loader.open().unwrap()));
    }

    #[test]
    fn loader_ships_location_only() {
        let temp = tempdir().unwrap();
        OffHeapIndexMapWriter::new(temp.path(), 2)
            .write_shard("global", sample_keys())
            .unwrap();
        let loader = OffHeapIndexMapLoader::new(temp.path(), 2, "global");
        loader.open().unwrap();

        let wire = serde_json::to_string(&loader).unwrap();
        let received: OffHeapIndexMapLoader = serde_json::from_str(&wire).unwrap();
        assert!(!received.is_open());
        assert_eq!(received.shard_id(), "global");
        assert_eq!(received.open().unwrap().len(), 50);
    }

    fn err_is_configuration(err: &IndexingError) -> bool {
        matches!(err, IndexingError::Configuration(_))
    }
}
