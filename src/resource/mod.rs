//! HTTP resource vocabulary used by the cache
//!
//! The cache reasons about requests and responses only through the types in
//! this module:
//! - `ResourceRequest`: URL, method, headers and the loader-side hints
//!   (cache policy, partition, requester, priority)
//! - `ResponseMetadata`: status, headers and the final URL of a response
//! - `SecurityOrigin` / `RegistrableDomain`: grouping keys for bulk deletion

mod codec;
mod date;
mod origin;
mod request;
mod response;

pub use date::parse_http_date;
pub use origin::{RegistrableDomain, SecurityOrigin};
pub use request::{CachePolicy, LoadPriority, Requester, ResourceRequest};
pub use response::ResponseMetadata;

/// Returns the values of `name` joined with ", ", or `None` when absent.
pub(crate) fn header_value(headers: &http::HeaderMap, name: &str) -> Option<String> {
    let mut values = headers.get_all(name).iter().peekable();
    values.peek()?;

    let joined = values
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect::<Vec<_>>()
        .join(", ");
    Some(joined)
}

/// True for `http` and `https` URLs.
pub(crate) fn is_http_family(url: &url::Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
