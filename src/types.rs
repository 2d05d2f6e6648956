/// Canonical encoded feature key (escaped name, delimiter, escaped term).
/// Example: `age_bucket\u{1}25-34`
pub type FeatureKey = String;
/// Identifier for a feature shard.
/// Examples: `global`, `per_member`, `per_item`
pub type FeatureShardId = String;
/// Identifier for a feature section (a bag of features in the raw input).
/// Examples: `userFeatures`, `songFeatures`
pub type SectionKey = String;
/// Raw feature name.
/// Example: `age_bucket`
pub type FeatureName = String;
/// Raw feature term (may be empty).
/// Example: `25-34`
pub type FeatureTerm = String;
/// Dense index assigned to a feature within its shard.
pub type FeatureIndex = usize;
/// Resolved input path strings handed to data readers.
/// Example: `/data/training/2020-01-02`
pub type PathString = String;
