//! HTTP cache validation primitives (RFC 7234 §4)
//!
//! Age and freshness computation, cacheable status codes, `Vary` snapshots
//! and header merging after a `304 Not Modified`.

use http::header::{HeaderName, VARY};
use http::HeaderMap;
use std::time::{Duration, SystemTime};

use crate::resource::{ResourceRequest, ResponseMetadata};

/// Heuristic lifetime for permanent redirects and `410 Gone`.
const PERMANENT_STATUS_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Fraction of the `Last-Modified` interval used as heuristic lifetime.
const HEURISTIC_FRESHNESS_FACTOR: f64 = 0.1;

/// Status codes a cache may store without explicit freshness information.
const DEFAULT_CACHEABLE_STATUS_CODES: [u16; 11] =
    [200, 203, 204, 206, 300, 301, 404, 405, 410, 414, 501];

/// Status codes a cache may store only with `Expires` or `max-age`.
const POTENTIALLY_CACHEABLE_STATUS_CODES: [u16; 7] = [201, 202, 205, 302, 303, 307, 308];

/// Headers never copied from a `304` onto the stored response.
const HEADERS_TO_IGNORE_AFTER_REVALIDATION: [&str; 11] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "www-authenticate",
    "x-frame-options",
    "x-xss-protection",
];

const HEADER_PREFIXES_TO_IGNORE_AFTER_REVALIDATION: [&str; 3] =
    ["content-", "x-content-", "x-webkit-"];

/// Marker recorded for `Vary: *`.
const VARY_ANY: &str = "*";

/// Snapshot of the request headers a response varies on: lowercase name and
/// the value sent with the original request (`None` when it was absent).
pub type VaryingRequestHeaders = Vec<(String, Option<String>)>;

pub fn is_status_code_cacheable_by_default(status: u16) -> bool {
    DEFAULT_CACHEABLE_STATUS_CODES.contains(&status)
}

pub fn is_status_code_potentially_cacheable(status: u16) -> bool {
    POTENTIALLY_CACHEABLE_STATUS_CODES.contains(&status)
}

fn saturating_elapsed(later: SystemTime, earlier: SystemTime) -> Duration {
    later.duration_since(earlier).unwrap_or_default()
}

/// Current age of a stored response (RFC 7234 §4.2.3).
///
/// `response_time` is when the response was received and stored.
pub fn current_age(response: &ResponseMetadata, response_time: SystemTime, now: SystemTime) -> Duration {
    let apparent_age = response
        .date()
        .map(|date| saturating_elapsed(response_time, date))
        .unwrap_or_default();
    let corrected_initial_age = match response.age() {
        Some(age) => apparent_age.max(age),
        None => apparent_age,
    };
    let resident_time = saturating_elapsed(now, response_time);
    corrected_initial_age.saturating_add(resident_time)
}

/// Freshness lifetime of a response (RFC 7234 §4.2.1).
pub fn freshness_lifetime(response: &ResponseMetadata, response_time: SystemTime) -> Duration {
    if !response.is_in_http_family() {
        return Duration::ZERO;
    }

    if let Some(max_age) = response.cache_control().max_age {
        return max_age;
    }

    let date = response.date();
    let effective_date = date.unwrap_or(response_time);

    if let Some(expires) = response.expires() {
        return saturating_elapsed(expires, effective_date);
    }

    if matches!(response.status, 301 | 410) {
        return PERMANENT_STATUS_LIFETIME;
    }

    if let Some(last_modified) = response.last_modified() {
        return saturating_elapsed(effective_date, last_modified).mul_f64(HEURISTIC_FRESHNESS_FACTOR);
    }

    Duration::ZERO
}

fn vary_header_names(response: &ResponseMetadata) -> Vec<String> {
    response
        .headers
        .get_all(VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Record the request's values for every header named in the response's `Vary`.
pub fn collect_varying_request_headers(
    request: &ResourceRequest,
    response: &ResponseMetadata,
) -> VaryingRequestHeaders {
    vary_header_names(response)
        .into_iter()
        .map(|name| {
            if name == VARY_ANY {
                (name, None)
            } else {
                let value = request.header(&name);
                (name, value)
            }
        })
        .collect()
}

/// True when `request` sends exactly the recorded values.
pub fn verify_varying_request_headers(
    varying_request_headers: &VaryingRequestHeaders,
    request: &ResourceRequest,
) -> bool {
    varying_request_headers.iter().all(|(name, value)| {
        if name == VARY_ANY {
            return false;
        }
        request.header(name) == *value
    })
}

fn should_update_header_after_revalidation(name: &HeaderName) -> bool {
    let name = name.as_str();
    if HEADERS_TO_IGNORE_AFTER_REVALIDATION.contains(&name) {
        return false;
    }
    !HEADER_PREFIXES_TO_IGNORE_AFTER_REVALIDATION
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Merge the headers of a `304 Not Modified` into the stored response.
pub fn update_response_headers_after_revalidation(
    response: &mut ResponseMetadata,
    validating_response: &ResponseMetadata,
) {
    let mut updated = HeaderMap::new();
    for (name, value) in validating_response.headers.iter() {
        if should_update_header_after_revalidation(name) {
            updated.append(name.clone(), value.clone());
        }
    }

    let names: Vec<HeaderName> = updated.keys().cloned().collect();
    for name in names {
        response.headers.remove(&name);
        for value in updated.get_all(&name) {
            response.headers.append(name.clone(), value.clone());
        }
    }
}
