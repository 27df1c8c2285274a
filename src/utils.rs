use chrono::{DateTime, SecondsFormat, TimeZone};

/// Format a timestamp the way the API expects it in query strings: RFC3339 with whole
/// seconds, `Z` for UTC and `+HH:MM` for any other offset.
pub fn format_query_timestamp<Tz>(ts: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: core::fmt::Display,
{
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
