//! Timezone selection, date filters and timestamp rendering for deletion times.

use crate::error::{Error, Result};
use crate::types::CorrelatedDeletion;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Fixed-offset zones for whole-hour `UTC±N`; the `Etc/GMT` names invert the sign
const OFFSET_ZONES: &[(i32, Tz)] = &[
    (0, Tz::UTC),
    (1, Tz::Etc__GMTMinus1),
    (2, Tz::Etc__GMTMinus2),
    (3, Tz::Etc__GMTMinus3),
    (4, Tz::Etc__GMTMinus4),
    (5, Tz::Etc__GMTMinus5),
    (6, Tz::Etc__GMTMinus6),
    (7, Tz::Etc__GMTMinus7),
    (8, Tz::Etc__GMTMinus8),
    (9, Tz::Etc__GMTMinus9),
    (10, Tz::Etc__GMTMinus10),
    (11, Tz::Etc__GMTMinus11),
    (12, Tz::Etc__GMTMinus12),
    (13, Tz::Etc__GMTMinus13),
    (14, Tz::Etc__GMTMinus14),
    (-1, Tz::Etc__GMTPlus1),
    (-2, Tz::Etc__GMTPlus2),
    (-3, Tz::Etc__GMTPlus3),
    (-4, Tz::Etc__GMTPlus4),
    (-5, Tz::Etc__GMTPlus5),
    (-6, Tz::Etc__GMTPlus6),
    (-7, Tz::Etc__GMTPlus7),
    (-8, Tz::Etc__GMTPlus8),
    (-9, Tz::Etc__GMTPlus9),
    (-10, Tz::Etc__GMTPlus10),
    (-11, Tz::Etc__GMTPlus11),
    (-12, Tz::Etc__GMTPlus12),
];

/// Parse `UTC` or `UTC+8` / `UTC-5` style notation
pub fn parse_timezone(timezone_str: &str) -> Result<Tz> {
    let offset_part = timezone_str.strip_prefix("UTC").ok_or_else(|| {
        Error::InvalidInput(format!(
            "Invalid timezone '{}'. Use 'UTC' or UTC offset notation like 'UTC+8'",
            timezone_str
        ))
    })?;
    if offset_part.is_empty() {
        return Ok(Tz::UTC);
    }

    let offset_hours: i32 = offset_part.parse().map_err(|_| {
        Error::InvalidInput(format!(
            "Invalid UTC offset '{}'. Use format like 'UTC+8' or 'UTC-5'",
            timezone_str
        ))
    })?;

    OFFSET_ZONES
        .iter()
        .find(|(hours, _)| *hours == offset_hours)
        .map(|(_, tz)| *tz)
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "Unsupported UTC offset '{}'. Supported: UTC-12 through UTC+14",
                timezone_str
            ))
        })
}

/// Convert UTC datetime to specified timezone
pub fn convert_to_timezone(utc_dt: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    utc_dt.with_timezone(&tz)
}

/// Parse `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` as a UTC instant
pub fn parse_date_filter(date_str: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive_dt) = NaiveDateTime::parse_from_str(date_str, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive_dt));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        let naive_dt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::InvalidInput("Invalid date format".to_string()))?;
        return Ok(Utc.from_utc_datetime(&naive_dt));
    }

    Err(Error::InvalidInput(format!(
        "Invalid date format '{}'. Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS",
        date_str
    )))
}

/// Render as `Sat 2012-12-15 07:06:40 UTC+8 `; deletion times carry whole seconds
pub fn format_timestamp_human<T: TimeZone>(dt: &DateTime<T>) -> String
where
    T::Offset: std::fmt::Display,
{
    format!(
        "{} {} {}",
        format_weekday(dt.weekday()),
        dt.format("%Y-%m-%d %H:%M:%S"),
        format_utc_offset(dt)
    )
}

fn format_weekday(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Offset padded to six columns: "UTC   ", "UTC+8 ", "UTC-10", "UTC+5:30"
fn format_utc_offset<T: TimeZone>(dt: &DateTime<T>) -> String {
    let offset_seconds = dt.offset().fix().local_minus_utc();
    let offset_hours = offset_seconds / 3600;
    let offset_minutes = (offset_seconds.abs() % 3600) / 60;

    if offset_minutes != 0 {
        let sign = if offset_seconds >= 0 { "+" } else { "-" };
        return format!("UTC{}{}:{:02}", sign, offset_hours.abs(), offset_minutes);
    }

    match offset_hours {
        0 => "UTC   ".to_string(),
        h if h > 0 => format!("{:<6}", format!("UTC+{}", h)),
        h => format!("{:<6}", format!("UTC{}", h)),
    }
}

/// Deletion time rendered in `timezone`, or "N/A" when out of range
pub fn format_deletion_time(deletion: &CorrelatedDeletion, timezone: Tz) -> String {
    deletion
        .record
        .deleted_at_utc()
        .map(|t| format_timestamp_human(&convert_to_timezone(t, timezone)))
        .unwrap_or_else(|| "N/A".to_string())
}

/// Check if a timestamp falls within the (inclusive) range
pub fn timestamp_in_range(
    timestamp: &Option<DateTime<Utc>>,
    after: &Option<DateTime<Utc>>,
    before: &Option<DateTime<Utc>>,
) -> bool {
    match timestamp {
        Some(ts) => after.map_or(true, |a| *ts >= a) && before.map_or(true, |b| *ts <= b),
        // Unrepresentable times only pass when no range is set
        None => after.is_none() && before.is_none(),
    }
}

/// Check a deletion's time against the range
pub fn deletion_in_date_range(
    deletion: &CorrelatedDeletion,
    after: &Option<DateTime<Utc>>,
    before: &Option<DateTime<Utc>>,
) -> bool {
    timestamp_in_range(&deletion.record.deleted_at_utc(), after, before)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timezone("UTC").is_ok());
        assert!(parse_timezone("UTC+8").is_ok());
        assert!(parse_timezone("UTC-5").is_ok());
        assert!(parse_timezone("UTC+0").is_ok());
        assert!(parse_timezone("Invalid/Timezone").is_err());
        assert!(parse_timezone("America/New_York").is_err());
        assert!(parse_timezone("UTC+25").is_err());
        assert!(parse_timezone("UTC+x").is_err());
    }

    #[test]
    fn test_parse_date_filter() {
        let dt = parse_date_filter("2023-12-25").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2023-12-25 00:00:00");

        let dt = parse_date_filter("2023-12-25 15:30:45").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2023-12-25 15:30:45");

        assert!(parse_date_filter("invalid-date").is_err());
        assert!(parse_date_filter("2023/12/25").is_err());
    }

    #[test]
    fn test_timestamp_in_range() {
        let ts = Some(at(2023, 12, 25, 12));
        let after = Some(at(2023, 12, 20, 0));
        let before = Some(at(2023, 12, 30, 0));
        assert!(timestamp_in_range(&ts, &after, &before));
        assert!(!timestamp_in_range(&ts, &Some(at(2023, 12, 26, 0)), &before));
        assert!(timestamp_in_range(&None, &None, &None));
        assert!(!timestamp_in_range(&None, &after, &None));
    }

    #[test]
    fn test_format_human_utc() {
        // 1355526400 = Fri 2012-12-14 23:06:40 UTC
        let dt = DateTime::from_timestamp(1355526400, 0).unwrap();
        assert_eq!(format_timestamp_human(&dt), "Fri 2012-12-14 23:06:40 UTC   ");
    }

    #[test]
    fn test_offsets_ignore_daylight_saving() {
        let winter = at(2012, 12, 14, 23);
        let summer = at(2012, 7, 1, 12);
        let plus_one = parse_timezone("UTC+1").unwrap();
        let minus_five = parse_timezone("UTC-5").unwrap();

        assert_eq!(
            format_timestamp_human(&convert_to_timezone(winter, plus_one)),
            "Sat 2012-12-15 00:00:00 UTC+1 "
        );
        assert_eq!(
            format_timestamp_human(&convert_to_timezone(summer, plus_one)),
            "Sun 2012-07-01 13:00:00 UTC+1 "
        );
        assert_eq!(
            format_timestamp_human(&convert_to_timezone(winter, minus_five)),
            "Fri 2012-12-14 18:00:00 UTC-5 "
        );
        assert_eq!(
            format_timestamp_human(&convert_to_timezone(summer, minus_five)),
            "Sun 2012-07-01 07:00:00 UTC-5 "
        );
    }

    #[test]
    fn test_offset_range_edges() {
        let noon = at(2024, 1, 1, 12);
        let kiribati = convert_to_timezone(noon, parse_timezone("UTC+14").unwrap());
        assert_eq!(format_timestamp_human(&kiribati), "Tue 2024-01-02 02:00:00 UTC+14");
        let baker = convert_to_timezone(noon, parse_timezone("UTC-12").unwrap());
        assert_eq!(format_timestamp_human(&baker), "Mon 2024-01-01 00:00:00 UTC-12");
        assert!(parse_timezone("UTC+15").is_err());
        assert!(parse_timezone("UTC-13").is_err());
    }

    #[test]
    fn test_format_human_offsets() {
        let base = at(2024, 1, 1, 12);

        let hk = convert_to_timezone(base, parse_timezone("UTC+8").unwrap());
        assert_eq!(format_timestamp_human(&hk), "Mon 2024-01-01 20:00:00 UTC+8 ");

        let hawaii = convert_to_timezone(base, Tz::Pacific__Honolulu);
        assert!(format_timestamp_human(&hawaii).ends_with("UTC-10"));

        let kolkata = convert_to_timezone(base, Tz::Asia__Kolkata);
        assert!(format_timestamp_human(&kolkata).ends_with("UTC+5:30"));
    }
}
