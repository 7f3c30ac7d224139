//! Timeframe extraction for prediction text.
//!
//! Patterns are tried in precedence order; month-granular results resolve
//! to the last day of that month.

use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate, Utc};
use regex::Regex;

static RE_QUARTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bQ([1-4])[\s-]+(?:of\s+)?(\d{4})\b").unwrap());
static RE_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?,?\s+(?:of\s+)?(\d{4})\b",
    )
    .unwrap()
});
static RE_MID_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:by|within|mid)[\s-]+(\d{4})\b").unwrap());
static RE_END_OF_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bend\s+of\s+(\d{4})\b").unwrap());
static RE_WITHIN_MONTHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwithin\s+(?:the\s+next\s+)?(\d{1,2}|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|eighteen|twenty-four)\s+months?\b").unwrap()
});

/// Every timeframe pattern, for callers that need to strip timeframes out.
pub(crate) fn timeframe_patterns() -> [&'static Regex; 5] {
    [
        &*RE_QUARTER,
        &*RE_MONTH_YEAR,
        &*RE_MID_YEAR,
        &*RE_END_OF_YEAR,
        &*RE_WITHIN_MONTHS,
    ]
}

pub fn extract_target_date(text: &str) -> Option<NaiveDate> {
    extract_target_date_from(text, Utc::now().date_naive())
}

/// Resolve the first recognised timeframe in `text`, relative to `today`.
pub fn extract_target_date_from(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = RE_QUARTER.captures(text) {
        let quarter: u32 = caps[1].parse().ok()?;
        let year: i32 = caps[2].parse().ok()?;
        return last_day_of_month(year, quarter * 3);
    }

    if let Some(caps) = RE_MONTH_YEAR.captures(text) {
        let month = month_number(&caps[1])?;
        let year: i32 = caps[2].parse().ok()?;
        return last_day_of_month(year, month);
    }

    if let Some(caps) = RE_MID_YEAR.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        return last_day_of_month(year, 6);
    }

    if let Some(caps) = RE_END_OF_YEAR.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        return last_day_of_month(year, 12);
    }

    if let Some(caps) = RE_WITHIN_MONTHS.captures(text) {
        let months = count_value(&caps[1])?;
        return today.checked_add_days(Days::new(30 * months));
    }

    None
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let month = match prefix.as_str() {
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

fn count_value(word: &str) -> Option<u64> {
    if let Ok(n) = word.parse() {
        return Some(n);
    }
    let n = match word.to_lowercase().as_str() {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "eighteen" => 18,
        "twenty-four" => 24,
        _ => return None,
    };
    Some(n)
}
