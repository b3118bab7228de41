//! Cache-Control header parsing (RFC 7234 §5.2).
//!
//! The same directive set is used for requests and responses; the decision
//! engine reads the ones that apply to each side:
//! - request: `no-cache`, `max-age`, `max-stale`, `no-store`
//! - response: `no-cache`, `no-store`, `max-age`, `stale-while-revalidate`
//!
//! # Example
//!
//! ```rust
//! use http_disk_cache::cache::CacheControl;
//!
//! let cc = CacheControl::parse("max-age=3600, stale-while-revalidate=60");
//! assert_eq!(cc.max_age, Some(std::time::Duration::from_secs(3600)));
//! assert_eq!(cc.stale_while_revalidate, Some(std::time::Duration::from_secs(60)));
//! ```

use http::header::{CACHE_CONTROL, PRAGMA};
use http::HeaderMap;
use std::time::Duration;

/// Parsed Cache-Control directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// max-age directive
    pub max_age: Option<Duration>,

    /// Stored copy must be revalidated before every use. Set for both the
    /// bare directive and the field-name form (`no-cache="Set-Cookie"`).
    pub no_cache: bool,

    /// Nothing about the exchange may be stored
    pub no_store: bool,

    /// Request-side max-stale. A bare `max-stale` accepts any staleness and
    /// is represented as `Duration::MAX`.
    pub max_stale: Option<Duration>,

    /// Additional staleness a response may be served with while it is
    /// refreshed in the background
    pub stale_while_revalidate: Option<Duration>,
}

impl CacheControl {
    /// Parse a Cache-Control header value.
    ///
    /// Directive names are case-insensitive, values may be quoted, unknown
    /// directives and unparseable values are ignored.
    pub fn parse(header_value: &str) -> Self {
        let mut result = Self::default();

        for directive in header_value.split(',') {
            let directive = directive.trim().to_lowercase();
            if directive.is_empty() {
                continue;
            }

            if let Some((name, value)) = directive.split_once('=') {
                let name = name.trim();
                let value = value.trim().trim_matches('"');

                match name {
                    "max-age" => result.max_age = parse_seconds(value),
                    "max-stale" if value.is_empty() => result.max_stale = Some(Duration::MAX),
                    "max-stale" => {
                        if let Some(max_stale) = parse_seconds(value) {
                            result.max_stale = Some(max_stale);
                        }
                    }
                    "stale-while-revalidate" => {
                        result.stale_while_revalidate = parse_seconds(value)
                    }
                    "no-cache" => result.no_cache = true,
                    _ => {}
                }
            } else {
                match directive.as_str() {
                    "no-cache" => result.no_cache = true,
                    "no-store" => result.no_store = true,
                    "max-stale" => result.max_stale = Some(Duration::MAX),
                    _ => {}
                }
            }
        }

        result
    }

    /// Directives from every `Cache-Control` value in `headers`.
    ///
    /// When no `Cache-Control` header is present, `Pragma: no-cache` is
    /// honoured as `no-cache` (RFC 7234 §5.4).
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let values: Vec<&str> = headers
            .get_all(CACHE_CONTROL)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();

        if !values.is_empty() {
            return Self::parse(&values.join(","));
        }

        let pragma_no_cache = headers
            .get_all(PRAGMA)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("no-cache"));

        Self {
            no_cache: pragma_no_cache,
            ..Self::default()
        }
    }

    /// True when a response carries a non-zero stale-while-revalidate budget.
    pub fn allows_stale_while_revalidate(&self) -> bool {
        self.stale_while_revalidate
            .is_some_and(|budget| !budget.is_zero())
    }
}

fn parse_seconds(value: &str) -> Option<Duration> {
    value.parse::<u64>().ok().map(Duration::from_secs)
}
