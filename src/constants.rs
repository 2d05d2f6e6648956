/// Constants used by feature key encoding.
pub mod feature_key {
    /// Separator placed between the escaped name and the escaped term.
    pub const KEY_DELIMITER: char = '\u{1}';
    /// Escape character used inside names and terms.
    pub const KEY_ESCAPE: char = '\\';
    /// Escape code emitted (after `KEY_ESCAPE`) for a literal delimiter.
    pub const ESCAPED_DELIMITER_CODE: char = 'd';
    /// Name of the synthetic intercept (bias) feature.
    pub const INTERCEPT_NAME: &str = "(INTERCEPT)";
    /// Term of the synthetic intercept feature.
    pub const INTERCEPT_TERM: &str = "";
}

/// Constants used by the text feature-set reader.
pub mod feature_sets {
    /// Field separator between name and term on one input line.
    pub const NAME_TERM_DELIMITER: char = '\t';
    /// Log message used when malformed input lines are skipped.
    pub const SKIP_MALFORMED_MSG: &str = "skipping malformed feature line";
}

/// Constants used by the off-heap partitioned index store.
pub mod off_heap {
    /// Metadata key holding the encoded partition header.
    pub const META_KEY: &[u8] = b"__meta__";
    /// Prefix for forward entries (feature key -> local index).
    pub const KEY_ENTRY_PREFIX: &[u8] = b"k:";
    /// Prefix for reverse entries (local index -> feature key).
    pub const INDEX_ENTRY_PREFIX: &[u8] = b"i:";
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Version tag for partition metadata compatibility checks.
    pub const STORE_VERSION: u8 = 1;
    /// Filename prefix for partition files inside a shard directory.
    pub const PARTITION_FILE_PREFIX: &str = "partition-";
    /// Filename extension for partition files.
    pub const PARTITION_FILE_EXTENSION: &str = "bin";
    /// Partition count used when configuration does not specify one.
    pub const DEFAULT_NUM_PARTITIONS: usize = 1;
    /// Entries per `batch_write` call while building a partition.
    pub const WRITE_BATCH: usize = 4096;
}

/// Constants used by date-range parsing and input path resolution.
pub mod date_range {
    /// Canonical date format for explicit ranges (`2020-01-01:2020-01-03`).
    pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
    /// Separator between start and end of an ISO range.
    pub const ISO_RANGE_DELIMITER: char = ':';
    /// Compact date format for explicit ranges (`20200101-20200103`).
    pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";
    /// Separator between start and end of a compact range.
    pub const COMPACT_RANGE_DELIMITER: char = '-';
    /// Accepted separators between the two numbers of a days-ago spec.
    pub const DAYS_AGO_DELIMITERS: [char; 2] = [':', '-'];
    /// Default relative path segment derived from a date.
    pub const DEFAULT_DATE_PATH_FORMAT: &str = "%Y-%m-%d";
}
