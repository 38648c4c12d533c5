/// Convert Windows filetime values to unixepoch
pub(crate) fn filetime_to_unixepoch(filetime: u64) -> i64 {
    let windows_nano = 10000000;
    let seconds_to_unix: i64 = 11644473600;

    // We should not overflow because of the division.
    (filetime / windows_nano) as i64 - seconds_to_unix
}

/// Convert unixepoch seconds to ISO8601 timestamp
pub(crate) fn unixepoch_to_iso(timestamp: i64) -> String {
    use chrono::{SecondsFormat, TimeZone, Utc};

    match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(time) => time.to_rfc3339_opts(SecondsFormat::Millis, true),
        _ => String::from("1970-01-01T00:00:00.000Z"),
    }
}
