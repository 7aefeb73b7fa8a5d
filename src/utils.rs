// Utility functions
use chrono::{Datelike, Months, NaiveDate};

/// Parses a `YYYY-MM-DD` date, or a `YYYY-MM` month, if possible.
pub fn parse_date(date_str: &str) -> Option<NaiveDate> {
    let s = date_str.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d"))
        .ok()
}

/// Normalises a location name into the key used for joins.
pub fn location_key(location: &str) -> String {
    location.trim().to_lowercase()
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Month ordinal (year * 12 + zero-based month), for month distances.
pub fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(NaiveDate::MAX)
}

pub fn sub_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months)).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_accepts_day_and_month_forms() {
        assert_eq!(parse_date("2024-05-17"), NaiveDate::from_ymd_opt(2024, 5, 17));
        assert_eq!(parse_date("2024-05"), NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(parse_date("17/05/2024"), None);
    }

    #[test]
    fn test_location_key_is_case_insensitive() {
        assert_eq!(location_key("  Downtown "), location_key("downtown"));
    }

    #[test]
    fn test_month_arithmetic() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(month_start(d), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(add_months(month_start(d), 13), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(sub_months(month_start(d), 1), NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(month_index(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()) - month_index(d), 13);
    }
}
