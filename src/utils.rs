use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// Bounds of the fiscal year that starts in `start_year` on the first day of
/// `start_month`.
///
/// # Examples
/// - start month 4 (India), start year 2022: 2022-04-01 ..= 2023-03-31
/// - start month 1 (calendar), start year 2023: 2023-01-01 ..= 2023-12-31
pub fn fiscal_year_bounds(start_year: i32, start_month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(start_year, start_month, 1)?;
    let (end_year, end_month) = if start_month == 1 {
        (start_year, 12)
    } else {
        (start_year + 1, start_month - 1)
    };
    Some((start, last_day_of_month(end_year, end_month)?))
}

/// The fiscal year (as its starting calendar year) that contains `date`.
pub fn fiscal_year_start_year(date: NaiveDate, start_month: u32) -> i32 {
    if date.month() >= start_month {
        date.year()
    } else {
        date.year() - 1
    }
}

/// "FY2022-23" style label for the fiscal year containing `date`.
pub fn fiscal_year_label(date: NaiveDate, start_month: u32) -> String {
    let start_year = fiscal_year_start_year(date, start_month);
    if start_month == 1 {
        format!("FY{}", start_year)
    } else {
        format!("FY{}-{:02}", start_year, (start_year + 1).rem_euclid(100))
    }
}

/// Start of the twelve-month period that ends on `end` (inclusive).
pub fn year_ending_start(end: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if end.month() == 12 {
        (end.year(), 1)
    } else {
        (end.year() - 1, end.month() + 1)
    };
    if last_day_of_month(end.year(), end.month())? == end {
        NaiveDate::from_ymd_opt(year, month, 1)
    } else {
        end.checked_sub_days(Days::new(365))?.checked_add_days(Days::new(1))
    }
}

pub fn expand_two_digit_year(year: u32) -> i32 {
    if year < 100 {
        2000 + year as i32
    } else {
        year as i32
    }
}

pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim_end_matches('.').to_lowercase();
    let month = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

pub fn round_confidence(value: f64) -> f64 {
    (value.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Lowercases and collapses every run of whitespace to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
