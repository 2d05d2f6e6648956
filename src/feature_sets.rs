use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::constants::feature_sets::{NAME_TERM_DELIMITER, SKIP_MALFORMED_MSG};
use crate::errors::IndexingError;
use crate::feature_key::NameAndTerm;
use crate::transport::fs::sorted_files_under;
use crate::types::{FeatureName, FeatureTerm, SectionKey};

/// One raw feature occurrence tagged with the section it came from.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureRecord {
    /// Section the feature was observed in.
    pub section: SectionKey,
    /// Feature name.
    pub name: FeatureName,
    /// Feature term.
    pub term: FeatureTerm,
}

impl FeatureRecord {
    /// Create a record.
    pub fn new(
        section: impl Into<SectionKey>,
        name: impl Into<FeatureName>,
        term: impl Into<FeatureTerm>,
    ) -> Self {
        Self {
            section: section.into(),
            name: name.into(),
            term: term.into(),
        }
    }
}

/// De-duplicated (name, term) sets keyed by section.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameAndTermFeatureSets {
    sections: BTreeMap<SectionKey, BTreeSet<NameAndTerm>>,
}

impl NameAndTermFeatureSets {
    /// Empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect records, dropping exact duplicates.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = FeatureRecord>,
    {
        let mut sets = Self::new();
        for record in records {
            sets.insert(record);
        }
        sets
    }

    /// Add one record.
    pub fn insert(&mut self, record: FeatureRecord) {
        self.sections
            .entry(record.section)
            .or_default()
            .insert(NameAndTerm::new(record.name, record.term));
    }

    /// Register a section even if it has no features.
    pub fn ensure_section(&mut self, section: impl Into<SectionKey>) {
        self.sections.entry(section.into()).or_default();
    }

    /// Features of `section`, if the section was read.
    pub fn section(&self, section: &str) -> Option<&BTreeSet<NameAndTerm>> {
        self.sections.get(section)
    }

    /// True if `section` was read.
    pub fn contains_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Section keys present, in order.
    pub fn section_keys(&self) -> impl Iterator<Item = &SectionKey> {
        self.sections.keys()
    }

    /// Every record, section-major.
    pub fn records(&self) -> impl Iterator<Item = FeatureRecord> + '_ {
        self.sections.iter().flat_map(|(section, features)| {
            features
                .iter()
                .map(move |feature| FeatureRecord::new(section, &feature.name, &feature.term))
        })
    }

    /// Total (section, name, term) entries.
    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeSet::len).sum()
    }

    /// True when no section holds any feature.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Supplier of raw feature records for index-map construction.
pub trait FeatureRecordSource: Send + Sync {
    /// Read the features of the requested sections.
    ///
    /// Sections that do not exist in the underlying storage are left out of
    /// the result rather than reported as errors.
    fn read_sections(
        &self,
        sections: &BTreeSet<SectionKey>,
    ) -> Result<NameAndTermFeatureSets, IndexingError>;
}

impl FeatureRecordSource for NameAndTermFeatureSets {
    fn read_sections(
        &self,
        sections: &BTreeSet<SectionKey>,
    ) -> Result<NameAndTermFeatureSets, IndexingError> {
        let sections = self
            .sections
            .iter()
            .filter(|(section, _)| sections.contains(*section))
            .map(|(section, features)| (section.clone(), features.clone()))
            .collect();
        Ok(Self { sections })
    }
}

/// Reads `name<TAB>term` listings from `<root>/<section>/` directories.
///
/// Every text file below a section directory is read; blank lines are
/// ignored and a line without a tab is a feature with an empty term.
#[derive(Clone, Debug)]
pub struct TextFeatureSetReader {
    root: PathBuf,
    follow_links: bool,
    text_files_only: bool,
}

impl TextFeatureSetReader {
    /// Reader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_links: false,
            text_files_only: true,
        }
    }

    /// Control whether symlinks are followed while walking sections.
    pub fn with_follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Read every file, not only `.txt` files.
    pub fn with_text_files_only(mut self, text_files_only: bool) -> Self {
        self.text_files_only = text_files_only;
        self
    }

    /// Directory holding `section`'s listings.
    pub fn section_dir(&self, section: &str) -> PathBuf {
        self.root.join(section)
    }

    fn read_section_into(
        &self,
        section: &str,
        dir: &Path,
        sets: &mut NameAndTermFeatureSets,
    ) -> Result<(), IndexingError> {
        let section_io = |path: &Path, source: io::Error| IndexingError::FeatureSetIo {
            section: section.to_string(),
            path: path.to_path_buf(),
            shard_ids: Vec::new(),
            source,
        };
        let files = sorted_files_under(dir, self.follow_links, self.text_files_only)
            .map_err(|err| section_io(dir, err))?;
        sets.ensure_section(section);
        for file in files {
            let contents = fs::read_to_string(&file).map_err(|err| section_io(&file, err))?;
            for (line_no, line) in contents.lines().enumerate() {
                match parse_feature_line(line) {
                    Some(Some(feature)) => sets.insert(FeatureRecord::new(
                        section,
                        feature.name,
                        feature.term,
                    )),
                    Some(None) => {}
                    None => warn!(
                        section,
                        path = %file.display(),
                        line = line_no + 1,
                        "{}",
                        SKIP_MALFORMED_MSG
                    ),
                }
            }
        }
        Ok(())
    }
}

impl FeatureRecordSource for TextFeatureSetReader {
    fn read_sections(
        &self,
        sections: &BTreeSet<SectionKey>,
    ) -> Result<NameAndTermFeatureSets, IndexingError> {
        let mut sets = NameAndTermFeatureSets::new();
        for section in sections {
            let dir = self.section_dir(section);
            let exists = dir
                .try_exists()
                .map_err(|err| IndexingError::FeatureSetIo {
                    section: section.clone(),
                    path: dir.clone(),
                    shard_ids: Vec::new(),
                    source: err,
                })?;
            if !exists {
                debug!(section = %section, path = %dir.display(), "feature section not found");
                continue;
            }
            self.read_section_into(section, &dir, &mut sets)?;
        }
        debug!(
            root = %self.root.display(),
            sections = sets.sections.len(),
            features = sets.len(),
            "read feature sets"
        );
        Ok(sets)
    }
}

/// `None` for malformed lines, `Some(None)` for blank ones.
fn parse_feature_line(line: &str) -> Option<Option<NameAndTerm>> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return Some(None);
    }
    let mut fields = line.split(NAME_TERM_DELIMITER);
    let name = fields.next()?;
    let term = fields.next().unwrap_or("");
    if name.is_empty() || fields.next().is_some() {
        return None;
    }
    Some(Some(NameAndTerm::new(name, term)))
}
