use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};

use crate::constants::date_range::{
    COMPACT_DATE_FORMAT, COMPACT_RANGE_DELIMITER, DAYS_AGO_DELIMITERS, ISO_DATE_FORMAT,
    ISO_RANGE_DELIMITER,
};
use crate::errors::{IndexingError, configuration};

/// Inclusive range of calendar dates with `start <= end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Range from `start` through `end`; fails when `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, IndexingError> {
        if start > end {
            return Err(configuration(format!(
                "invalid date range: start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse an explicit range.
    ///
    /// Accepts `YYYY-MM-DD:YYYY-MM-DD` and the compact `YYYYMMDD-YYYYMMDD`.
    pub fn parse(spec: &str) -> Result<Self, IndexingError> {
        let spec = spec.trim();
        let (start, end) = if let Some((start, end)) = spec.split_once(ISO_RANGE_DELIMITER) {
            (
                parse_date(start, ISO_DATE_FORMAT, spec)?,
                parse_date(end, ISO_DATE_FORMAT, spec)?,
            )
        } else if let Some((start, end)) = spec.split_once(COMPACT_RANGE_DELIMITER) {
            (
                parse_date(start, COMPACT_DATE_FORMAT, spec)?,
                parse_date(end, COMPACT_DATE_FORMAT, spec)?,
            )
        } else {
            return Err(configuration(format!(
                "invalid date range '{spec}': expected START:END (YYYY-MM-DD) or START-END (YYYYMMDD)"
            )));
        };
        Self::new(start, end)
    }

    /// Range from `start_days_ago` through `end_days_ago` before `today`.
    ///
    /// `7, 1` is the week ending yesterday; `0, 0` is just `today`.
    pub fn from_days_ago(
        start_days_ago: u32,
        end_days_ago: u32,
        today: NaiveDate,
    ) -> Result<Self, IndexingError> {
        if start_days_ago < end_days_ago {
            return Err(configuration(format!(
                "invalid days-ago range {start_days_ago}:{end_days_ago}: start must be at least as many days ago as end"
            )));
        }
        let days_before = |days: u32| {
            today.checked_sub_days(Days::new(days.into())).ok_or_else(|| {
                configuration(format!("{days} days before {today} is out of range"))
            })
        };
        Self::new(days_before(start_days_ago)?, days_before(end_days_ago)?)
    }

    /// Parse a days-ago spec (`7:1` or `7-1`) relative to `today`.
    pub fn parse_days_ago(spec: &str, today: NaiveDate) -> Result<Self, IndexingError> {
        let spec = spec.trim();
        let (start, end) = spec
            .split_once(DAYS_AGO_DELIMITERS)
            .ok_or_else(|| {
                configuration(format!(
                    "invalid days-ago range '{spec}': expected START:END day counts"
                ))
            })?;
        let parse_days = |raw: &str| {
            raw.trim().parse::<u32>().map_err(|_| {
                configuration(format!(
                    "invalid days-ago range '{spec}': '{}' is not a non-negative day count",
                    raw.trim()
                ))
            })
        };
        Self::from_days_ago(parse_days(start)?, parse_days(end)?, today)
    }

    /// First date.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last date (inclusive).
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of dates in the range.
    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Every date in ascending order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |date| *date <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.start.format(ISO_DATE_FORMAT),
            ISO_RANGE_DELIMITER,
            self.end.format(ISO_DATE_FORMAT)
        )
    }
}

impl FromStr for DateRange {
    type Err = IndexingError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        Self::parse(spec)
    }
}

fn parse_date(raw: &str, format: &str, spec: &str) -> Result<NaiveDate, IndexingError> {
    NaiveDate::parse_from_str(raw.trim(), format).map_err(|err| {
        configuration(format!(
            "invalid date '{}' in range '{spec}': {err}",
            raw.trim()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_iso_and_compact_ranges() {
        let expected = DateRange::new(date(2020, 1, 1), date(2020, 1, 3)).unwrap();
        assert_eq!(DateRange::parse("2020-01-01:2020-01-03").unwrap(), expected);
        assert_eq!(DateRange::parse("20200101-20200103").unwrap(), expected);
        assert_eq!(DateRange::parse(" 2020-01-01 : 2020-01-03 ").unwrap(), expected);
        assert_eq!("2020-01-01:2020-01-03".parse::<DateRange>().unwrap(), expected);
        assert_eq!(expected.to_string(), "2020-01-01:2020-01-03");
    }

    #[test]
    fn single_day_range_is_allowed() {
        let range = DateRange::parse("2020-02-29:2020-02-29").unwrap();
        assert_eq!(range.num_days(), 1);
        assert_eq!(range.dates().collect::<Vec<_>>(), vec![date(2020, 2, 29)]);
    }

    #[test]
    fn rejects_unparsable_and_inverted_ranges() {
        for spec in [
            "",
            "2020-01-01",
            "2020-01-01:",
            "2020-13-01:2020-13-02",
            "2020-01-03:2020-01-01",
            "20200103-20200101",
            "2020/01/01:2020/01/03",
            "yesterday:today",
        ] {
            let err = DateRange::parse(spec).unwrap_err();
            assert!(err.is_configuration(), "{spec:?} should be a configuration error");
        }
    }

    #[test]
    fn dates_cross_month_and_year_boundaries() {
        let range = DateRange::parse("2019-12-30:2020-01-02").unwrap();
        assert_eq!(range.num_days(), 4);
        assert_eq!(
            range.dates().collect::<Vec<_>>(),
            vec![
                date(2019, 12, 30),
                date(2019, 12, 31),
                date(2020, 1, 1),
                date(2020, 1, 2)
            ]
        );
    }

    #[test]
    fn days_ago_is_relative_to_today() {
        let today = date(2020, 3, 2);
        let range = DateRange::parse_days_ago("7:1", today).unwrap();
        assert_eq!(range.start(), date(2020, 2, 24));
        assert_eq!(range.end(), date(2020, 3, 1));
        assert_eq!(DateRange::parse_days_ago("7-1", today).unwrap(), range);
        assert_eq!(
            DateRange::parse_days_ago("0:0", today).unwrap(),
            DateRange::new(today, today).unwrap()
        );
    }

    #[test]
    fn days_ago_rejects_inverted_and_malformed_specs() {
        let today = date(2020, 3, 2);
        for spec in ["1:7", "7", "a:b", "-1:0", "7:", ""] {
            let err = DateRange::parse_days_ago(spec, today).unwrap_err();
            assert!(err.is_configuration(), "{spec:?} should be a configuration error");
        }
    }
}
