//! Calendar day handling for report retrieval
use crate::error::{FeedError, Result};
use chrono::NaiveDate;

/// Compute the listing window for one calendar day.
///
/// gvmd's `created>X and created<Y` filter bounds are exclusive on the
/// upper end, so the window for a day runs from that day to the next.
///
/// # Arguments
///
/// * `day` - Day of month (1-31)
/// * `month` - Month of year (1-12)
/// * `year` - Four-digit year
///
/// # Returns
///
/// The `(from, to)` date pair, where `to` is the day after `from`.
///
/// # Errors
///
/// Returns [`FeedError::InvalidDate`] when the components do not form a
/// real calendar date, e.g. February 30th.
pub fn report_window(day: u32, month: u32, year: i32) -> Result<(NaiveDate, NaiveDate)> {
    let from = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        FeedError::InvalidDate(format!(
            "{year:04}-{month:02}-{day:02} is not a valid calendar date"
        ))
    })?;

    let to = from.succ_opt().ok_or_else(|| {
        FeedError::InvalidDate(format!("no day follows {from} in the supported date range"))
    })?;

    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_window_mid_month() {
        let (from, to) = report_window(1, 11, 2022).unwrap();
        assert_eq!(from.to_string(), "2022-11-01");
        assert_eq!(to.to_string(), "2022-11-02");
    }

    #[test]
    fn test_report_window_month_boundary() {
        let (from, to) = report_window(31, 1, 2023).unwrap();
        assert_eq!(from.to_string(), "2023-01-31");
        assert_eq!(to.to_string(), "2023-02-01");
    }

    #[test]
    fn test_report_window_year_boundary() {
        let (from, to) = report_window(31, 12, 2022).unwrap();
        assert_eq!(from.to_string(), "2022-12-31");
        assert_eq!(to.to_string(), "2023-01-01");
    }

    #[test]
    fn test_report_window_leap_day() {
        let (from, to) = report_window(29, 2, 2024).unwrap();
        assert_eq!(from.to_string(), "2024-02-29");
        assert_eq!(to.to_string(), "2024-03-01");
    }

    #[test]
    fn test_report_window_rejects_nonexistent_dates() {
        assert!(report_window(29, 2, 2023).is_err());
        assert!(report_window(30, 2, 2024).is_err());
        assert!(report_window(31, 4, 2023).is_err());

        let err = report_window(30, 2, 2023).unwrap_err();
        assert!(matches!(err, FeedError::InvalidDate(_)));
        assert!(err.to_string().contains("2023-02-30"));
    }
}
