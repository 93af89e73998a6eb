//! Date and time-of-day parsing for scheduling requests.
//!
//! Operators submit dates from spreadsheets and chat forms, so two families of
//! formats are accepted: ISO (`2026-11-05`) and US slash dates with either a
//! two-digit (`11/5/26`) or four-digit (`11/5/2026`) year.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};

use crate::ScheduleError;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Parses a calendar date in any accepted format.
///
/// Slash dates are tried with a two-digit year first, so `"1/5/26"` is 2026.
/// A four-digit year never matches the two-digit pattern because chrono
/// requires `%y` to consume exactly two digits.
pub fn parse_date(input: &str) -> Result<NaiveDate, ScheduleError> {
    let trimmed = input.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ScheduleError::InvalidDateFormat {
            value: input.to_string(),
        })
}

/// Parses a time of day (`HH:MM:SS` or `HH:MM`).
pub fn parse_time(input: &str) -> Option<NaiveTime> {
    let trimmed = input.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
}

/// Parses a comma-separated list of dates.
///
/// Blank entries are ignored. Returns every unparseable entry rather than
/// stopping at the first.
pub fn parse_date_list(input: &str) -> Result<BTreeSet<NaiveDate>, Vec<ScheduleError>> {
    let mut dates = BTreeSet::new();
    let mut errors = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match parse_date(part) {
            Ok(date) => {
                dates.insert(date);
            }
            Err(err) => errors.push(err),
        }
    }

    if errors.is_empty() {
        Ok(dates)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepts_iso_and_slash_formats() {
        assert_eq!(parse_date("2026-11-05").unwrap(), ymd(2026, 11, 5));
        assert_eq!(parse_date("11/5/26").unwrap(), ymd(2026, 11, 5));
        assert_eq!(parse_date("11/05/2026").unwrap(), ymd(2026, 11, 5));
        assert_eq!(parse_date(" 2026-11-05 ").unwrap(), ymd(2026, 11, 5));
    }

    #[test]
    fn unparseable_dates_name_the_offending_string() {
        let err = parse_date("next tuesday").unwrap_err();
        assert_eq!(
            err,
            ScheduleError::InvalidDateFormat {
                value: "next tuesday".to_string()
            }
        );
    }

    #[test]
    fn date_lists_report_every_bad_entry() {
        let ok = parse_date_list("11/26/26, 2026-12-24,").unwrap();
        assert_eq!(ok.len(), 2);

        let errs = parse_date_list("11/26/26, bogus, 2026-13-01").unwrap_err();
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn times_accept_optional_seconds() {
        assert_eq!(
            parse_time("19:30:00"),
            NaiveTime::from_hms_opt(19, 30, 0)
        );
        assert_eq!(parse_time("19:30"), NaiveTime::from_hms_opt(19, 30, 0));
        assert!(parse_time("7pm").is_none());
    }
}
