//! Calendar windows for dashboard trends. All boundaries are UTC midnights
//! expressed as epoch seconds; a window is `[start, end)`.

use chrono::{Datelike, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::errors::{AppError, Result};

pub const DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Window {
    pub label: String,
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts < self.end
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn midnight(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)).timestamp()
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Start of the month containing `date`.
pub fn month_start(date: NaiveDate) -> i64 {
    midnight(first_of_month(date))
}

/// The last `n` calendar months ending with the one containing `today`,
/// oldest first, labelled `YYYY-MM`.
pub fn month_windows(today: NaiveDate, n: u32) -> Vec<Window> {
    let current = first_of_month(today);
    (0..n)
        .rev()
        .filter_map(|back| {
            let first = current.checked_sub_months(Months::new(back))?;
            let next = first.checked_add_months(Months::new(1))?;
            Some(Window {
                label: first.format("%Y-%m").to_string(),
                start: midnight(first),
                end: midnight(next),
            })
        })
        .collect()
}

/// The last `n` days ending with `today`, oldest first, labelled `YYYY-MM-DD`.
pub fn day_windows(today: NaiveDate, n: i64) -> Vec<Window> {
    let end_of_today = midnight(today) + DAY;
    (0..n)
        .rev()
        .map(|back| {
            let start = end_of_today - (back + 1) * DAY;
            Window {
                label: date_label(start),
                start,
                end: start + DAY,
            }
        })
        .collect()
}

pub fn date_label(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// `YYYY-MM-DD` as typed in report filters.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Date invalide: {raw}")))
}

/// Optional `[from, to]` filter as epoch bounds, `to` inclusive of its day.
pub fn date_range(from: Option<&str>, to: Option<&str>) -> Result<(Option<i64>, Option<i64>)> {
    let from = from
        .filter(|s| !s.is_empty())
        .map(parse_date)
        .transpose()?
        .map(midnight);
    let to = to
        .filter(|s| !s.is_empty())
        .map(parse_date)
        .transpose()?
        .map(|d| midnight(d) + DAY);
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_windows_cross_year_boundaries() {
        let windows = month_windows(date(2024, 2, 20), 6);
        let labels: Vec<_> = windows.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(
            labels,
            ["2023-09", "2023-10", "2023-11", "2023-12", "2024-01", "2024-02"]
        );
        assert_eq!(windows[5].start, midnight(date(2024, 2, 1)));
        assert_eq!(windows[5].end, midnight(date(2024, 3, 1)));
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn day_windows_end_with_today() {
        let windows = day_windows(date(2024, 3, 1), 30);
        assert_eq!(windows.len(), 30);
        assert_eq!(windows[29].label, "2024-03-01");
        assert_eq!(windows[28].label, "2024-02-29");
        assert!(windows[29].contains(midnight(date(2024, 3, 1)) + 3600));
        assert!(!windows[29].contains(midnight(date(2024, 3, 2))));
    }

    #[test]
    fn date_range_includes_the_last_day() {
        let (from, to) = date_range(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        assert_eq!(from, Some(midnight(date(2024, 1, 1))));
        assert_eq!(to, Some(midnight(date(2024, 2, 1))));
        assert_eq!(date_range(None, Some("")).unwrap(), (None, None));
        assert!(date_range(Some("01/02/2024"), None).is_err());
    }
}
