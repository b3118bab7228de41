//! Resource request as seen by the cache

use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use url::Url;

use super::codec;
use crate::cache::CacheControl;

/// How the loader wants the cache to be used for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Normal HTTP caching semantics
    #[default]
    UseProtocolCachePolicy,
    /// Skip the cache unless the request is conditional
    ReloadIgnoringCacheData,
    /// Use any cached copy regardless of freshness, load otherwise
    ReturnCacheDataElseLoad,
    /// Use any cached copy regardless of freshness, never load
    ReturnCacheDataDontLoad,
    /// Revalidate every cached copy
    RefreshAnyCacheData,
    /// Bypass the disk cache completely
    DoNotUseAnyCache,
}

impl CachePolicy {
    /// Policies used for history navigation accept stale entries as-is.
    pub fn allows_expired(self) -> bool {
        debug_assert!(self != CachePolicy::DoNotUseAnyCache);
        matches!(
            self,
            CachePolicy::ReturnCacheDataElseLoad | CachePolicy::ReturnCacheDataDontLoad
        )
    }
}

/// Which part of the engine issued the load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requester {
    #[default]
    Unspecified,
    Main,
    Xhr,
    Fetch,
    Media,
    ImportScripts,
    Ping,
    Beacon,
    EventSource,
}

/// Load priority, lowest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LoadPriority {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl LoadPriority {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

const CONDITIONAL_HEADERS: [HeaderName; 5] = [
    header::IF_MATCH,
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
    header::IF_UNMODIFIED_SINCE,
    header::IF_RANGE,
];

/// A request for a network resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub url: Url,
    #[serde(with = "codec::method")]
    pub method: Method,
    #[serde(with = "codec::header_map")]
    pub headers: HeaderMap,
    #[serde(default)]
    pub cache_policy: CachePolicy,
    /// Isolation partition, typically the top frame's site. Empty means unpartitioned.
    #[serde(default)]
    pub cache_partition: String,
    #[serde(default)]
    pub requester: Requester,
    #[serde(default)]
    pub priority: LoadPriority,
}

impl ResourceRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            headers: HeaderMap::new(),
            cache_policy: CachePolicy::default(),
            cache_partition: String::new(),
            requester: Requester::default(),
            priority: LoadPriority::default(),
        }
    }

    /// Shorthand for a `GET` request with default loader hints.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.cache_partition = partition.into();
        self
    }

    pub fn with_requester(mut self, requester: Requester) -> Self {
        self.requester = requester;
        self
    }

    pub fn with_priority(mut self, priority: LoadPriority) -> Self {
        self.priority = priority;
        self
    }

    /// All values of a request header joined with ", ".
    pub fn header(&self, name: &str) -> Option<String> {
        super::header_value(&self.headers, name)
    }

    pub fn cache_control(&self) -> CacheControl {
        CacheControl::from_headers(&self.headers)
    }

    /// Raw `Range` header, if any.
    pub fn range(&self) -> Option<String> {
        self.header(header::RANGE.as_str())
    }

    pub fn is_conditional(&self) -> bool {
        CONDITIONAL_HEADERS
            .iter()
            .any(|name| self.headers.contains_key(name))
    }

    pub fn has_fragment_identifier(&self) -> bool {
        self.url.fragment().is_some()
    }

    pub fn url_without_fragment(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }

    pub fn is_http_family(&self) -> bool {
        super::is_http_family(&self.url)
    }

    /// Credentials must never be persisted with a cached redirect.
    pub fn clear_authorization(&mut self) {
        self.headers.remove(header::AUTHORIZATION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> ResourceRequest {
        ResourceRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_default_request_uses_protocol_policy() {
        let req = request("https://example.com/");
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.cache_policy, CachePolicy::UseProtocolCachePolicy);
        assert_eq!(req.priority, LoadPriority::Medium);
        assert!(req.cache_partition.is_empty());
    }

    #[test]
    fn test_conditional_headers_make_request_conditional() {
        assert!(!request("https://example.com/").is_conditional());

        for name in CONDITIONAL_HEADERS {
            let req =
                request("https://example.com/").with_header(name, HeaderValue::from_static("x"));
            assert!(req.is_conditional());
        }
    }

    #[test]
    fn test_url_without_fragment() {
        let req = request("https://example.com/page?q=1#section");
        assert!(req.has_fragment_identifier());
        assert_eq!(req.url_without_fragment(), "https://example.com/page?q=1");
    }

    #[test]
    fn test_multiple_header_values_are_joined() {
        let req = request("https://example.com/")
            .with_header(header::ACCEPT, HeaderValue::from_static("text/html"))
            .with_header(header::ACCEPT, HeaderValue::from_static("*/*"));
        assert_eq!(req.header("accept").as_deref(), Some("text/html, */*"));
        assert_eq!(req.header("accept-language"), None);
    }

    #[test]
    fn test_clear_authorization() {
        let mut req = request("https://example.com/")
            .with_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        req.clear_authorization();
        assert!(req.header("authorization").is_none());
    }

    #[test]
    fn test_allows_expired_only_for_history_policies() {
        assert!(CachePolicy::ReturnCacheDataElseLoad.allows_expired());
        assert!(CachePolicy::ReturnCacheDataDontLoad.allows_expired());
        assert!(!CachePolicy::UseProtocolCachePolicy.allows_expired());
        assert!(!CachePolicy::ReloadIgnoringCacheData.allows_expired());
        assert!(!CachePolicy::RefreshAnyCacheData.allows_expired());
    }

    #[test]
    fn test_request_serialization_keeps_method_and_headers() {
        let req = request("https://example.com/a")
            .with_header(header::ACCEPT, HeaderValue::from_static("image/*"));
        let json = serde_json::to_string(&req).unwrap();
        let decoded: ResourceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, req);
    }
}
