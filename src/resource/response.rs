//! Response metadata stored alongside cached bodies

use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use url::Url;

use super::{codec, parse_http_date};
use crate::cache::CacheControl;

/// Everything about a response except its body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    #[serde(with = "codec::header_map")]
    pub headers: HeaderMap,
    /// Set when the response was obtained by following a redirect
    #[serde(default)]
    pub was_redirected: bool,
}

impl ResponseMetadata {
    pub fn new(url: Url, status: u16) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            was_redirected: false,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces every value of `name` with `value`.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn header(&self, name: &str) -> Option<String> {
        super::header_value(&self.headers, name)
    }

    /// Lowercased media type from `Content-Type`, without parameters.
    pub fn mime_type(&self) -> Option<String> {
        let value = self.headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let mime = value.split(';').next()?.trim().to_ascii_lowercase();
        if mime.is_empty() {
            None
        } else {
            Some(mime)
        }
    }

    pub fn cache_control(&self) -> CacheControl {
        CacheControl::from_headers(&self.headers)
    }

    pub fn date(&self) -> Option<SystemTime> {
        self.date_header(header::DATE)
    }

    pub fn expires(&self) -> Option<SystemTime> {
        self.date_header(header::EXPIRES)
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.date_header(header::LAST_MODIFIED)
    }

    /// `Age` header in seconds. Invalid values are ignored.
    pub fn age(&self) -> Option<Duration> {
        let value = self.headers.get(header::AGE)?.to_str().ok()?;
        value.trim().parse::<u64>().ok().map(Duration::from_secs)
    }

    pub fn has_cache_validator_fields(&self) -> bool {
        self.headers.contains_key(header::LAST_MODIFIED) || self.headers.contains_key(header::ETAG)
    }

    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_in_http_family(&self) -> bool {
        super::is_http_family(&self.url)
    }

    fn date_header(&self, name: HeaderName) -> Option<SystemTime> {
        let value = self.headers.get(name)?.to_str().ok()?;
        parse_http_date(value)
    }
}
