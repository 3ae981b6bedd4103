//! Reporting periods for dashboards and exports

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::DateRange;

/// A dashboard period, always ending today unless custom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "period")]
pub enum ReportPeriod {
    Today,
    /// Since Monday of the current week
    Week,
    Month,
    Quarter,
    Year,
    Custom {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

impl Default for ReportPeriod {
    fn default() -> Self {
        ReportPeriod::Month
    }
}

impl ReportPeriod {
    /// Interpret the `period`, `start_date` and `end_date` query parameters.
    ///
    /// Unknown period names are rejected; a custom period falls back to the
    /// first of the month and today for missing bounds.
    pub fn from_query(
        period: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self, &'static str> {
        Ok(match period.unwrap_or("month") {
            "today" => ReportPeriod::Today,
            "week" => ReportPeriod::Week,
            "month" => ReportPeriod::Month,
            "quarter" => ReportPeriod::Quarter,
            "year" => ReportPeriod::Year,
            "custom" => ReportPeriod::Custom { start, end },
            _ => return Err("Period must be one of today, week, month, quarter, year, custom"),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReportPeriod::Today => "today",
            ReportPeriod::Week => "week",
            ReportPeriod::Month => "month",
            ReportPeriod::Quarter => "quarter",
            ReportPeriod::Year => "year",
            ReportPeriod::Custom { .. } => "custom",
        }
    }

    /// Inclusive date bounds of the period as seen on `today`
    pub fn bounds(&self, today: NaiveDate) -> DateRange {
        let first_of_month = today.with_day(1).unwrap_or(today);
        let start = match *self {
            ReportPeriod::Today => today,
            ReportPeriod::Week => {
                today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
            }
            ReportPeriod::Month => first_of_month,
            ReportPeriod::Quarter => {
                let quarter_month = (today.month() - 1) / 3 * 3 + 1;
                NaiveDate::from_ymd_opt(today.year(), quarter_month, 1).unwrap_or(today)
            }
            ReportPeriod::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
            ReportPeriod::Custom { start, end } => {
                return DateRange {
                    start: start.unwrap_or(first_of_month),
                    end: end.unwrap_or(today),
                }
            }
        };
        DateRange { start, end: today }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_bounds() {
        // A Thursday
        let today = date(2024, 8, 15);
        assert_eq!(ReportPeriod::Today.bounds(today).start, today);
        assert_eq!(ReportPeriod::Week.bounds(today).start, date(2024, 8, 12));
        assert_eq!(ReportPeriod::Month.bounds(today).start, date(2024, 8, 1));
        assert_eq!(ReportPeriod::Quarter.bounds(today).start, date(2024, 7, 1));
        assert_eq!(ReportPeriod::Year.bounds(today).start, date(2024, 1, 1));
        assert_eq!(ReportPeriod::Year.bounds(today).end, today);
    }

    #[test]
    fn test_custom_period_defaults() {
        let today = date(2024, 8, 15);
        let range = ReportPeriod::Custom {
            start: None,
            end: Some(date(2024, 8, 10)),
        }
        .bounds(today);
        assert_eq!(range.start, date(2024, 8, 1));
        assert_eq!(range.end, date(2024, 8, 10));
    }

    #[test]
    fn test_from_query() {
        assert_eq!(ReportPeriod::from_query(None, None, None), Ok(ReportPeriod::Month));
        assert_eq!(
            ReportPeriod::from_query(Some("quarter"), None, None),
            Ok(ReportPeriod::Quarter)
        );
        assert!(ReportPeriod::from_query(Some("decade"), None, None).is_err());
    }
}
