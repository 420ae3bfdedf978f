//! Parsing of tag timestamps and human-readable page date labels into (year, month).

use chrono::{Datelike, Month, NaiveDate};

/// Parses the date part of a tag value.
///
/// Accepts EXIF (`2020:05:17 10:11:12`, optionally with sub-seconds and an
/// offset), RFC 3339 (`2020-05-17T10:11:12Z`) and plain ISO dates. Zero or
/// otherwise invalid dates yield `None`.
pub fn parse_tag_date(raw: &str) -> Option<(i32, u32)> {
    let date_part = raw
        .trim()
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()?;
    ["%Y:%m:%d", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .map(|d| (d.year(), d.month()))
}

/// Parses the date label shown on an item page.
///
/// Accepts ISO dates and English labels that name a month and a four-digit
/// year, with an optional weekday, day and time: `May 17, 2020`,
/// `Sun, May 17, 2020, 10:11 AM`, `17 May 2020`, `May 2020`. Labels without a
/// year (e.g. `May 17` for the current year) are rejected so the result does
/// not depend on when the run happens.
pub fn parse_page_label(label: &str) -> Option<(i32, u32)> {
    let label = label.trim();
    if let Some(iso) = parse_tag_date(label) {
        return Some(iso);
    }

    let mut month: Option<u32> = None;
    let mut year: Option<i32> = None;
    let mut day: Option<u32> = None;

    for token in label
        .split(|c: char| c.is_whitespace() || c == ',' || c == '.')
        .filter(|t| !t.is_empty())
    {
        if month.is_none() {
            if let Ok(m) = token.parse::<Month>() {
                month = Some(m.number_from_month());
                continue;
            }
        }
        if token.bytes().all(|b| b.is_ascii_digit()) {
            match token.len() {
                4 if year.is_none() => year = token.parse().ok(),
                1 | 2 if day.is_none() => day = token.parse().ok(),
                _ => {}
            }
        }
    }

    let (year, month) = (year?, month?);
    NaiveDate::from_ymd_opt(year, month, day.unwrap_or(1))?;
    Some((year, month))
}
