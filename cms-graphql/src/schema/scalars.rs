//! Custom scalar types.

use async_graphql::dynamic::Scalar;
use async_graphql::Value as GqlValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

fn is_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn is_datetime(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .into_iter()
            .any(|format| NaiveDateTime::parse_from_str(s, format).is_ok())
}

fn is_time(s: &str) -> bool {
    ["%H:%M:%S%.f", "%H:%M"]
        .into_iter()
        .any(|format| NaiveTime::parse_from_str(s, format).is_ok())
}

fn string_scalar(name: &str, description: &str, valid: fn(&str) -> bool) -> Scalar {
    Scalar::new(name)
        .description(description)
        .validator(move |value| matches!(value, GqlValue::String(s) if valid(s)))
}

/// The custom scalars used by generated types.
pub(crate) fn scalars() -> Vec<Scalar> {
    vec![
        string_scalar("Date", "A calendar date in ISO 8601 format.", is_date),
        string_scalar(
            "DateTime",
            "A date and time in ISO 8601 format, with an optional UTC offset.",
            is_datetime,
        ),
        string_scalar("Time", "A time of day in ISO 8601 format.", is_time),
        Scalar::new("GenericScalar")
            .description("Any JSON value, passed through without validation."),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_formats() {
        assert!(is_date("2020-02-29"));
        assert!(!is_date("2021-02-29"));
        assert!(is_datetime("2020-01-02T03:04:05+00:00"));
        assert!(is_datetime("2020-01-02T03:04:05.123"));
        assert!(is_datetime("2020-01-02 03:04:05"));
        assert!(!is_datetime("2020-01-02"));
        assert!(is_time("12:30"));
        assert!(is_time("12:30:15.5"));
        assert!(!is_time("25:00"));
    }
}
