//! HTTP-date parsing (RFC 7231 §7.1.1.1)

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::time::SystemTime;

/// Obsolete RFC 850 form, e.g. `Sunday, 06-Nov-94 08:49:37 GMT`
const RFC850_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S GMT";

/// ANSI C asctime() form, e.g. `Sun Nov  6 08:49:37 1994`, after
/// whitespace runs are collapsed.
const ASCTIME_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Parse an HTTP date in any of the three formats recipients must accept.
///
/// Returns `None` for anything unparseable. Callers treat that the same as
/// an absent header.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(SystemTime::from(date));
    }

    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    [RFC850_FORMAT, ASCTIME_FORMAT]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&collapsed, format).ok())
        .map(|naive| SystemTime::from(Utc.from_utc_datetime(&naive)))
}
