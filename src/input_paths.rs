//! Resolve the physical input paths of a time window.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::InputWindowConfig;
use crate::date_range::DateRange;
use crate::errors::{IndexingError, configuration};
use crate::transport::fs::FileSystem;
use crate::types::PathString;

/// Date range selected by a window config, or `None` for "no date filtering".
pub fn resolve_date_range(
    window: &InputWindowConfig,
    today: NaiveDate,
) -> Result<Option<DateRange>, IndexingError> {
    match (window.date_range.as_deref(), window.days_ago.as_deref()) {
        (Some(range), Some(days_ago)) => Err(configuration(format!(
            "ambiguous date specification: dateRange '{range}' and daysAgo '{days_ago}' are both set"
        ))),
        (Some(range), None) => DateRange::parse(range).map(Some),
        (None, Some(days_ago)) => DateRange::parse_days_ago(days_ago, today).map(Some),
        (None, None) => Ok(None),
    }
}

/// Turns base directories plus a window config into existing input paths.
#[derive(Clone, Debug)]
pub struct InputPathResolver {
    window: InputWindowConfig,
    today: NaiveDate,
}

impl InputPathResolver {
    /// Resolver anchored at the current UTC date.
    pub fn new(window: InputWindowConfig) -> Self {
        Self {
            window,
            today: Utc::now().date_naive(),
        }
    }

    /// Anchor days-ago ranges at `today` instead of the current date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Date range this resolver filters by, if any.
    pub fn date_range(&self) -> Result<Option<DateRange>, IndexingError> {
        resolve_date_range(&self.window, self.today)
    }

    /// Resolve `base_dirs` into input paths.
    ///
    /// Without a date spec the base directories are returned unchanged.
    /// Otherwise each base directory (in order) contributes its existing
    /// dated sub-paths (ascending by date); missing dates are skipped unless
    /// `error_on_missing` is set.
    pub fn resolve<S>(
        &self,
        base_dirs: &[S],
        fs: &dyn FileSystem,
    ) -> Result<Vec<PathString>, IndexingError>
    where
        S: AsRef<str>,
    {
        let Some(range) = self.date_range()? else {
            return Ok(base_dirs
                .iter()
                .map(|dir| dir.as_ref().to_string())
                .collect());
        };
        let format = &self.window.date_path_format;
        let items = date_path_items(format)?;
        let segments: Vec<(NaiveDate, String)> = range
            .dates()
            .map(|date| date_path_segment(date, &items, format).map(|segment| (date, segment)))
            .collect::<Result<_, _>>()?;
        let candidates: Vec<(NaiveDate, PathBuf)> = base_dirs
            .iter()
            .flat_map(|dir| {
                let dir = Path::new(dir.as_ref());
                segments
                    .iter()
                    .map(move |(date, segment)| (*date, dir.join(segment)))
            })
            .collect();

        // Probes may finish in any order; collecting keeps candidate order.
        let present: Vec<bool> = candidates
            .par_iter()
            .map(|(_, path)| fs.exists(path))
            .collect::<Result<_, _>>()?;

        let mut paths = Vec::with_capacity(candidates.len());
        for ((date, path), exists) in candidates.into_iter().zip(present) {
            let path = path.to_string_lossy().into_owned();
            if exists {
                paths.push(path);
            } else if self.window.error_on_missing {
                return Err(IndexingError::MissingInput {
                    date: date.to_string(),
                    path,
                });
            } else {
                debug!(date = %date, path = %path, "skipping missing dated input");
            }
        }
        if paths.is_empty() {
            warn!(
                range = %range,
                base_dirs = base_dirs.len(),
                "no input paths found for date range"
            );
        }
        Ok(paths)
    }
}

/// Validated strftime items for the per-date path segment.
fn date_path_items(format: &str) -> Result<Vec<Item<'_>>, IndexingError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(configuration(format!("invalid date path format '{format}'")));
    }
    Ok(items)
}

/// Format one date; fails for layouts that need fields a date lacks (`%H`).
fn date_path_segment(
    date: NaiveDate,
    items: &[Item<'_>],
    format: &str,
) -> Result<String, IndexingError> {
    let mut segment = String::new();
    write!(segment, "{}", date.format_with_items(items.iter())).map_err(|_| {
        configuration(format!(
            "invalid date path format '{format}': cannot format date {date}"
        ))
    })?;
    Ok(segment)
}
