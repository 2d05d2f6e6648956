use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{FeatureShardId, SectionKey};

/// Error type for configuration, feature-set IO, and off-heap store failures.
#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(
        "failed to read feature section '{section}' at {} (shards: [{}]): {source}",
        path.display(),
        shard_ids.join(", ")
    )]
    FeatureSetIo {
        section: SectionKey,
        path: PathBuf,
        shard_ids: Vec<FeatureShardId>,
        #[source]
        source: io::Error,
    },
    #[error("off-heap index store not found: {}", path.display())]
    StoreNotFound { path: PathBuf },
    #[error("off-heap index store at {} is corrupt: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },
    #[error("missing input path for {date}: {path}")]
    MissingInput { date: String, path: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl IndexingError {
    /// True for the configuration variant.
    pub fn is_configuration(&self) -> bool {
        matches!(self, IndexingError::Configuration(_))
    }

    /// Attach the shards that requested a failing feature section.
    ///
    /// Other variants pass through unchanged.
    pub fn with_shard_context<F>(self, shards_for_section: F) -> Self
    where
        F: FnOnce(&str) -> Vec<FeatureShardId>,
    {
        match self {
            IndexingError::FeatureSetIo {
                section,
                path,
                shard_ids,
                source,
            } if shard_ids.is_empty() => {
                let shard_ids = shards_for_section(&section);
                IndexingError::FeatureSetIo {
                    section,
                    path,
                    shard_ids,
                    source,
                }
            }
            other => other,
        }
    }
}

pub(crate) fn configuration(message: impl Into<String>) -> IndexingError {
    IndexingError::Configuration(message.into())
}
