//! Cache decisions
//!
//! Three decisions drive the cache:
//! - retrieve: should storage be consulted at all for a request
//! - use: can a stored entry answer a request, and under which conditions
//! - store: may a network response be written to storage
//!
//! Every decision is a closed enum. Callers match on all variants; a `No*`
//! variant is a normal outcome, not an error.

use std::fmt;
use std::time::{Duration, SystemTime};

use super::entry::Entry;
use super::validation::{
    current_age, freshness_lifetime, is_status_code_cacheable_by_default,
    is_status_code_potentially_cacheable, verify_varying_request_headers,
};
use crate::resource::{CachePolicy, LoadPriority, Requester, ResourceRequest, ResponseMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrieveDecision {
    Yes,
    NoDueToHttpMethod,
    NoDueToReloadIgnoringCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseDecision {
    Use,
    /// Serve the stored copy and refresh it in the background
    AsyncRevalidate,
    /// Revalidate with the server before use
    Validate,
    NoDueToVaryingHeaderMismatch,
    NoDueToRequestContainingFragments,
    NoDueToMissingValidatorFields,
    NoDueToExpiredRedirect,
    NoDueToDecodeFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreDecision {
    Yes,
    NoDueToProtocol,
    NoDueToHttpMethod,
    NoDueToNoStoreRequest,
    NoDueToNoStoreResponse,
    NoDueToHttpStatusCode,
    NoDueToRequestContainingFragments,
    NoDueToUnlikelyToReuse,
    NoDueToStreamingMedia,
}

impl RetrieveDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            RetrieveDecision::Yes => "Yes",
            RetrieveDecision::NoDueToHttpMethod => "NoDueToHTTPMethod",
            RetrieveDecision::NoDueToReloadIgnoringCache => "NoDueToReloadIgnoringCache",
        }
    }
}

impl UseDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            UseDecision::Use => "Use",
            UseDecision::AsyncRevalidate => "AsyncRevalidate",
            UseDecision::Validate => "Validate",
            UseDecision::NoDueToVaryingHeaderMismatch => "NoDueToVaryingHeaderMismatch",
            UseDecision::NoDueToRequestContainingFragments => "NoDueToRequestContainingFragments",
            UseDecision::NoDueToMissingValidatorFields => "NoDueToMissingValidatorFields",
            UseDecision::NoDueToExpiredRedirect => "NoDueToExpiredRedirect",
            UseDecision::NoDueToDecodeFailure => "NoDueToDecodeFailure",
        }
    }
}

impl StoreDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreDecision::Yes => "Yes",
            StoreDecision::NoDueToProtocol => "NoDueToProtocol",
            StoreDecision::NoDueToHttpMethod => "NoDueToHTTPMethod",
            StoreDecision::NoDueToNoStoreRequest => "NoDueToNoStoreRequest",
            StoreDecision::NoDueToNoStoreResponse => "NoDueToNoStoreResponse",
            StoreDecision::NoDueToHttpStatusCode => "NoDueToHTTPStatusCode",
            StoreDecision::NoDueToRequestContainingFragments => "NoDueToRequestContainingFragments",
            StoreDecision::NoDueToUnlikelyToReuse => "NoDueToUnlikelyToReuse",
            StoreDecision::NoDueToStreamingMedia => "NoDueToStreamingMedia",
        }
    }
}

impl fmt::Display for RetrieveDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for UseDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for StoreDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether storage should be consulted for `request`.
///
/// Must not be called for `CachePolicy::DoNotUseAnyCache`.
pub fn make_retrieve_decision(request: &ResourceRequest) -> RetrieveDecision {
    debug_assert!(request.cache_policy != CachePolicy::DoNotUseAnyCache);

    if request.method != http::Method::GET {
        return RetrieveDecision::NoDueToHttpMethod;
    }
    if request.cache_policy == CachePolicy::ReloadIgnoringCacheData && !request.is_conditional() {
        return RetrieveDecision::NoDueToReloadIgnoringCache;
    }

    RetrieveDecision::Yes
}

/// Freshness of a stored response for `request` at `now`.
///
/// Returns `Use`, `AsyncRevalidate` or `Validate`. A request that sets
/// `max-stale` gets exactly that bound: the response's
/// stale-while-revalidate budget only extends the default of zero.
pub fn response_needs_revalidation(
    response: &ResponseMetadata,
    request: &ResourceRequest,
    timestamp: SystemTime,
    now: SystemTime,
    stale_while_revalidate_enabled: bool,
) -> UseDecision {
    let request_directives = request.cache_control();
    if request_directives.no_cache || request_directives.max_age == Some(Duration::ZERO) {
        return UseDecision::Validate;
    }

    let response_directives = response.cache_control();
    if response_directives.no_cache {
        return UseDecision::Validate;
    }

    let age = current_age(response, timestamp, now);
    let lifetime = freshness_lifetime(response, timestamp);
    let staleness = age.saturating_sub(lifetime);

    let mut maximum_staleness = request_directives.max_stale.unwrap_or(Duration::ZERO);
    let has_expired = staleness > maximum_staleness;

    if has_expired && request_directives.max_stale.is_none() && stale_while_revalidate_enabled {
        let budget = response_directives.stale_while_revalidate.unwrap_or_default();
        maximum_staleness = maximum_staleness.saturating_add(budget);
        if staleness < maximum_staleness {
            return UseDecision::AsyncRevalidate;
        }
    }

    if has_expired {
        return UseDecision::Validate;
    }

    UseDecision::Use
}

/// Decide how a stored `entry` may answer `request` at `now`.
pub fn make_use_decision(
    entry: &Entry,
    request: &ResourceRequest,
    now: SystemTime,
    stale_while_revalidate_enabled: bool,
) -> UseDecision {
    // Conditional requests go to the network; the stored copy only gets refreshed.
    if request.is_conditional() && !entry.is_redirect() {
        return UseDecision::Validate;
    }

    if !verify_varying_request_headers(entry.varying_request_headers(), request) {
        return UseDecision::NoDueToVaryingHeaderMismatch;
    }

    // History navigation.
    if request.cache_policy.allows_expired() {
        return UseDecision::Use;
    }

    // Redirect entries were stored for the URL without fragment.
    if request.has_fragment_identifier() && entry.is_redirect() {
        return UseDecision::NoDueToRequestContainingFragments;
    }

    let decision = response_needs_revalidation(
        entry.response(),
        request,
        entry.timestamp(),
        now,
        stale_while_revalidate_enabled,
    );
    if decision != UseDecision::Validate {
        return decision;
    }

    if !entry.response().has_cache_validator_fields() {
        return UseDecision::NoDueToMissingValidatorFields;
    }

    if entry.is_redirect() {
        UseDecision::NoDueToExpiredRedirect
    } else {
        UseDecision::Validate
    }
}

fn is_media_mime_type(mime_type: &str) -> bool {
    mime_type.starts_with("video/") || mime_type.starts_with("audio/")
}

/// Decide whether a network response for `request` may be stored.
///
/// `now` is used as the response time for the freshness computation.
pub fn make_store_decision(
    request: &ResourceRequest,
    response: &ResponseMetadata,
    body_size: usize,
    now: SystemTime,
) -> StoreDecision {
    if !request.is_http_family() || !response.is_in_http_family() {
        return StoreDecision::NoDueToProtocol;
    }

    if request.method != http::Method::GET {
        return StoreDecision::NoDueToHttpMethod;
    }

    let request_directives = request.cache_control();
    if request_directives.no_store {
        return StoreDecision::NoDueToNoStoreRequest;
    }

    let response_directives = response.cache_control();
    if response_directives.no_store {
        return StoreDecision::NoDueToNoStoreResponse;
    }

    if !is_status_code_cacheable_by_default(response.status) {
        // RFC 7234 §4.3.2
        let has_expiration_headers =
            response.expires().is_some() || response_directives.max_age.is_some();
        let expiration_headers_allow_caching =
            is_status_code_potentially_cacheable(response.status) && has_expiration_headers;
        if !expiration_headers_allow_caching {
            return StoreDecision::NoDueToHttpStatusCode;
        }
    }

    let is_redirect = response.is_redirection() || response.was_redirected;
    if is_redirect && request.has_fragment_identifier() {
        return StoreDecision::NoDueToRequestContainingFragments;
    }

    // Main resources and very high priority loads are stored regardless so
    // that back/forward navigation can use them.
    let is_main_resource = request.requester == Requester::Main;
    let store_unconditionally_for_history_navigation =
        is_main_resource || request.priority == LoadPriority::VeryHigh;
    if !store_unconditionally_for_history_navigation {
        let has_non_zero_lifetime = !freshness_lifetime(response, now).is_zero();
        let possibly_reusable = response.has_cache_validator_fields()
            || has_non_zero_lifetime
            || response_directives.allows_stale_while_revalidate();
        if !possibly_reusable {
            return StoreDecision::NoDueToUnlikelyToReuse;
        }
    }

    // Streamed media segments fill the cache and are rarely reused.
    let is_likely_streaming_media = request.requester == Requester::Media
        || (matches!(request.requester, Requester::Xhr | Requester::Fetch)
            && response.mime_type().as_deref().is_some_and(is_media_mime_type));
    if is_likely_streaming_media {
        return StoreDecision::NoDueToStreamingMedia;
    }

    tracing::trace!(
        url = %response.url,
        status = response.status,
        body_size = body_size,
        "Response eligible for storage"
    );

    StoreDecision::Yes
}

/// Whether a speculative revalidation may answer `request`.
pub fn can_use_speculative_revalidation(request: &ResourceRequest) -> bool {
    if request.is_conditional() {
        return false;
    }
    if matches!(request.requester, Requester::Xhr | Requester::Fetch) {
        return false;
    }
    matches!(
        request.cache_policy,
        CachePolicy::UseProtocolCachePolicy | CachePolicy::RefreshAnyCacheData
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Key;
    use bytes::Bytes;
    use http::header::{self, HeaderName};
    use http::{HeaderValue, Method};
    use rstest::rstest;
    use std::time::UNIX_EPOCH;
    use url::Url;

    const URL: &str = "https://example.com/app.js";

    fn stored_at() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn after(secs: u64) -> SystemTime {
        stored_at() + Duration::from_secs(secs)
    }

    fn request() -> ResourceRequest {
        ResourceRequest::get(Url::parse(URL).unwrap())
    }

    fn response(status: u16) -> ResponseMetadata {
        ResponseMetadata::new(Url::parse(URL).unwrap(), status)
    }

    fn with_cache_control(response: ResponseMetadata, value: &'static str) -> ResponseMetadata {
        response.with_header(header::CACHE_CONTROL, HeaderValue::from_static(value))
    }

    fn entry(response: ResponseMetadata) -> Entry {
        let key = Key::from_request(&request(), "Resource", &[0; 8]);
        Entry::new(key, response, Some(Bytes::from_static(b"body")), Vec::new())
            .with_timestamp(stored_at())
    }

    fn redirect_entry(response: ResponseMetadata) -> Entry {
        let key = Key::from_request(&request(), "Resource", &[0; 8]);
        let target = ResourceRequest::get(Url::parse("https://example.com/new.js").unwrap());
        Entry::new_redirect(key, response, target, Vec::new()).with_timestamp(stored_at())
    }

    // ---- retrieve decision ----

    #[rstest]
    #[case(Method::POST)]
    #[case(Method::HEAD)]
    #[case(Method::PUT)]
    #[case(Method::DELETE)]
    fn test_retrieve_rejects_non_get(#[case] method: Method) {
        let req = ResourceRequest::new(method, Url::parse(URL).unwrap());
        assert_eq!(make_retrieve_decision(&req), RetrieveDecision::NoDueToHttpMethod);
    }

    #[test]
    fn test_retrieve_reload_ignoring_cache() {
        let req = request().with_cache_policy(CachePolicy::ReloadIgnoringCacheData);
        assert_eq!(
            make_retrieve_decision(&req),
            RetrieveDecision::NoDueToReloadIgnoringCache
        );

        // A conditional reload still consults the cache so the entry can be updated.
        let conditional = req.with_header(header::IF_NONE_MATCH, HeaderValue::from_static("\"v1\""));
        assert_eq!(make_retrieve_decision(&conditional), RetrieveDecision::Yes);
    }

    #[rstest]
    #[case(CachePolicy::UseProtocolCachePolicy)]
    #[case(CachePolicy::ReturnCacheDataElseLoad)]
    #[case(CachePolicy::ReturnCacheDataDontLoad)]
    #[case(CachePolicy::RefreshAnyCacheData)]
    fn test_retrieve_yes(#[case] policy: CachePolicy) {
        let req = request().with_cache_policy(policy);
        assert_eq!(make_retrieve_decision(&req), RetrieveDecision::Yes);
    }

    // ---- freshness ----

    // Test: max-age=60 at 30s is fresh
    #[test]
    fn test_fresh_response_is_used() {
        let e = entry(with_cache_control(response(200), "max-age=60"));
        assert_eq!(make_use_decision(&e, &request(), after(30), true), UseDecision::Use);
    }

    // Test: max-age=60, swr=30 at 80s revalidates in the background
    #[test]
    fn test_stale_within_swr_budget_revalidates_async() {
        let e = entry(with_cache_control(
            response(200),
            "max-age=60, stale-while-revalidate=30",
        ));
        assert_eq!(
            make_use_decision(&e, &request(), after(80), true),
            UseDecision::AsyncRevalidate
        );
    }

    #[test]
    fn test_swr_disabled_for_session() {
        let e = entry(
            with_cache_control(response(200), "max-age=60, stale-while-revalidate=30")
                .with_header(header::ETAG, HeaderValue::from_static("\"v1\"")),
        );
        assert_eq!(
            make_use_decision(&e, &request(), after(80), false),
            UseDecision::Validate
        );
    }

    #[test]
    fn test_stale_beyond_swr_budget() {
        let e = entry(
            with_cache_control(response(200), "max-age=60, stale-while-revalidate=30")
                .with_header(header::ETAG, HeaderValue::from_static("\"v1\"")),
        );
        assert_eq!(
            make_use_decision(&e, &request(), after(90), true),
            UseDecision::Validate
        );
    }

    // Test: max-age=60 at 200s must validate
    #[test]
    fn test_expired_response_validates() {
        let e = entry(
            with_cache_control(response(200), "max-age=60")
                .with_header(header::ETAG, HeaderValue::from_static("\"v1\"")),
        );
        assert_eq!(
            make_use_decision(&e, &request(), after(200), true),
            UseDecision::Validate
        );
    }

    #[test]
    fn test_expired_response_without_validators() {
        let e = entry(with_cache_control(response(200), "max-age=60"));
        assert_eq!(
            make_use_decision(&e, &request(), after(200), true),
            UseDecision::NoDueToMissingValidatorFields
        );
    }

    // Test: explicit max-stale is honoured but never extended by stale-while-revalidate
    #[test]
    fn test_request_max_stale_disables_swr_extension() {
        let e = entry(
            with_cache_control(response(200), "max-age=60, stale-while-revalidate=100")
                .with_header(header::ETAG, HeaderValue::from_static("\"v1\"")),
        );
        let req = request().with_header(header::CACHE_CONTROL, HeaderValue::from_static("max-stale=10"));
        assert_eq!(make_use_decision(&e, &req, after(65), true), UseDecision::Use);
        assert_eq!(make_use_decision(&e, &req, after(80), true), UseDecision::Validate);
    }

    #[test]
    fn test_request_unbounded_max_stale() {
        let e = entry(with_cache_control(response(200), "max-age=60"));
        let req = request().with_header(header::CACHE_CONTROL, HeaderValue::from_static("max-stale"));
        assert_eq!(make_use_decision(&e, &req, after(1_000_000), true), UseDecision::Use);
    }

    #[test]
    fn test_request_malformed_max_stale_does_not_extend_freshness() {
        let e = entry(
            with_cache_control(response(200), "max-age=60")
                .with_header(header::ETAG, HeaderValue::from_static("\"v1\"")),
        );
        let req = request().with_header(header::CACHE_CONTROL, HeaderValue::from_static("max-stale=abc"));
        assert_eq!(make_use_decision(&e, &req, after(1_000_000), true), UseDecision::Validate);
    }

    #[rstest]
    #[case("no-cache")]
    #[case("max-age=0")]
    fn test_request_directives_force_validation(#[case] directive: &'static str) {
        let e = entry(
            with_cache_control(response(200), "max-age=600")
                .with_header(header::ETAG, HeaderValue::from_static("\"v1\"")),
        );
        let req = request().with_header(header::CACHE_CONTROL, HeaderValue::from_static(directive));
        assert_eq!(make_use_decision(&e, &req, after(1), true), UseDecision::Validate);
    }

    #[test]
    fn test_pragma_no_cache_forces_validation() {
        let e = entry(
            with_cache_control(response(200), "max-age=600")
                .with_header(header::ETAG, HeaderValue::from_static("\"v1\"")),
        );
        let req = request().with_header(header::PRAGMA, HeaderValue::from_static("no-cache"));
        assert_eq!(make_use_decision(&e, &req, after(1), true), UseDecision::Validate);
    }

    #[test]
    fn test_response_no_cache_forces_validation() {
        let e = entry(
            with_cache_control(response(200), "no-cache, max-age=600")
                .with_header(header::ETAG, HeaderValue::from_static("\"v1\"")),
        );
        assert_eq!(make_use_decision(&e, &request(), after(1), true), UseDecision::Validate);
    }

    // Test: increasing age never moves the decision back toward Use
    #[test]
    fn test_freshness_is_monotonic_in_age() {
        fn rank(decision: UseDecision) -> u8 {
            match decision {
                UseDecision::Use => 0,
                UseDecision::AsyncRevalidate => 1,
                _ => 2,
            }
        }

        let resp = with_cache_control(response(200), "max-age=60, stale-while-revalidate=30");
        let mut previous = 0;
        for secs in (0..400).step_by(5) {
            let decision =
                response_needs_revalidation(&resp, &request(), stored_at(), after(secs), true);
            let current = rank(decision);
            assert!(current >= previous, "decision went backward at {}s", secs);
            previous = current;
        }
        assert_eq!(previous, 2);
    }

    // ---- use decision ordering ----

    #[test]
    fn test_conditional_request_validates_direct_entry() {
        let e = entry(with_cache_control(response(200), "max-age=600"));
        let req = request().with_header(header::IF_MODIFIED_SINCE, HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"));
        assert_eq!(make_use_decision(&e, &req, after(1), true), UseDecision::Validate);
    }

    #[test]
    fn test_conditional_request_uses_fresh_redirect() {
        let e = redirect_entry(with_cache_control(response(301), "max-age=600"));
        let req = request().with_header(header::IF_NONE_MATCH, HeaderValue::from_static("\"v1\""));
        assert_eq!(make_use_decision(&e, &req, after(1), true), UseDecision::Use);
    }

    #[test]
    fn test_vary_mismatch() {
        let key = Key::from_request(&request(), "Resource", &[0; 8]);
        let e = Entry::new(
            key,
            with_cache_control(response(200), "max-age=600"),
            None,
            vec![("accept-language".into(), Some("en".into()))],
        )
        .with_timestamp(stored_at());

        let fr = request().with_header(header::ACCEPT_LANGUAGE, HeaderValue::from_static("fr"));
        assert_eq!(
            make_use_decision(&e, &fr, after(1), true),
            UseDecision::NoDueToVaryingHeaderMismatch
        );

        // Vary is checked even for history navigation.
        let history = fr.with_cache_policy(CachePolicy::ReturnCacheDataElseLoad);
        assert_eq!(
            make_use_decision(&e, &history, after(1), true),
            UseDecision::NoDueToVaryingHeaderMismatch
        );

        let en = request().with_header(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
        assert_eq!(make_use_decision(&e, &en, after(1), true), UseDecision::Use);
    }

    #[rstest]
    #[case(CachePolicy::ReturnCacheDataElseLoad)]
    #[case(CachePolicy::ReturnCacheDataDontLoad)]
    fn test_history_navigation_uses_expired_entry(#[case] policy: CachePolicy) {
        let e = entry(with_cache_control(response(200), "no-cache"));
        let req = request().with_cache_policy(policy);
        assert_eq!(make_use_decision(&e, &req, after(1_000_000), true), UseDecision::Use);
    }

    #[test]
    fn test_fragment_request_with_redirect_entry() {
        let e = redirect_entry(with_cache_control(response(301), "max-age=600"));
        let req = ResourceRequest::get(Url::parse(&format!("{}#frag", URL)).unwrap());
        assert_eq!(
            make_use_decision(&e, &req, after(1), true),
            UseDecision::NoDueToRequestContainingFragments
        );

        // Direct entries don't care about the fragment.
        let direct = entry(with_cache_control(response(200), "max-age=600"));
        assert_eq!(make_use_decision(&direct, &req, after(1), true), UseDecision::Use);
    }

    #[test]
    fn test_expired_redirect() {
        let e = redirect_entry(
            with_cache_control(response(302), "max-age=60")
                .with_header(header::ETAG, HeaderValue::from_static("\"v1\"")),
        );
        assert_eq!(
            make_use_decision(&e, &request(), after(120), true),
            UseDecision::NoDueToExpiredRedirect
        );
    }

    // ---- store decision ----

    #[test]
    fn test_store_cacheable_response() {
        let resp = with_cache_control(response(200), "max-age=60");
        assert_eq!(
            make_store_decision(&request(), &resp, 4, after(0)),
            StoreDecision::Yes
        );
    }

    #[test]
    fn test_store_rejects_non_http() {
        let req = ResourceRequest::get(Url::parse("file:///tmp/a").unwrap());
        let resp = ResponseMetadata::new(Url::parse("file:///tmp/a").unwrap(), 200);
        assert_eq!(
            make_store_decision(&req, &resp, 0, after(0)),
            StoreDecision::NoDueToProtocol
        );
    }

    #[rstest]
    #[case(Method::POST)]
    #[case(Method::HEAD)]
    #[case(Method::PATCH)]
    fn test_store_rejects_non_get(#[case] method: Method) {
        let req = ResourceRequest::new(method, Url::parse(URL).unwrap());
        let resp = with_cache_control(response(200), "max-age=60");
        assert_eq!(
            make_store_decision(&req, &resp, 0, after(0)),
            StoreDecision::NoDueToHttpMethod
        );
    }

    #[test]
    fn test_store_no_store_request_and_response() {
        let req = request().with_header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        let resp = with_cache_control(response(200), "max-age=60");
        assert_eq!(
            make_store_decision(&req, &resp, 0, after(0)),
            StoreDecision::NoDueToNoStoreRequest
        );

        let resp = with_cache_control(response(200), "no-store");
        assert_eq!(
            make_store_decision(&request(), &resp, 0, after(0)),
            StoreDecision::NoDueToNoStoreResponse
        );
    }

    #[rstest]
    #[case(500, "max-age=60", StoreDecision::NoDueToHttpStatusCode)]
    #[case(302, "", StoreDecision::NoDueToHttpStatusCode)]
    #[case(302, "max-age=60", StoreDecision::Yes)]
    #[case(201, "max-age=60", StoreDecision::Yes)]
    #[case(404, "max-age=60", StoreDecision::Yes)]
    fn test_store_status_codes(
        #[case] status: u16,
        #[case] cache_control: &'static str,
        #[case] expected: StoreDecision,
    ) {
        let resp = with_cache_control(response(status), cache_control);
        assert_eq!(make_store_decision(&request(), &resp, 0, after(0)), expected);
    }

    #[test]
    fn test_store_potentially_cacheable_with_expires() {
        let resp = response(307).with_header(header::EXPIRES, HeaderValue::from_static("Thu, 01 Jan 2099 00:00:00 GMT"));
        assert_eq!(
            make_store_decision(&request(), &resp, 0, after(0)),
            StoreDecision::Yes
        );
    }

    #[test]
    fn test_store_redirect_with_fragment() {
        let req = ResourceRequest::get(Url::parse(&format!("{}#frag", URL)).unwrap());
        let resp = with_cache_control(response(301), "max-age=60");
        assert_eq!(
            make_store_decision(&req, &resp, 0, after(0)),
            StoreDecision::NoDueToRequestContainingFragments
        );

        let mut redirected = with_cache_control(response(200), "max-age=60");
        redirected.was_redirected = true;
        assert_eq!(
            make_store_decision(&req, &redirected, 0, after(0)),
            StoreDecision::NoDueToRequestContainingFragments
        );
    }

    // Test: 200 without validators or expiration, loaded by XHR
    #[test]
    fn test_store_unlikely_to_reuse() {
        let req = request().with_requester(Requester::Xhr);
        assert_eq!(
            make_store_decision(&req, &response(200), 10, after(0)),
            StoreDecision::NoDueToUnlikelyToReuse
        );
    }

    #[rstest]
    #[case(header::ETAG, "\"v1\"")]
    #[case(header::LAST_MODIFIED, "Sun, 06 Nov 1994 08:49:37 GMT")]
    #[case(header::CACHE_CONTROL, "stale-while-revalidate=60")]
    fn test_store_possibly_reusable(#[case] name: HeaderName, #[case] value: &'static str) {
        let resp = response(200).with_header(name, HeaderValue::from_static(value));
        assert_eq!(
            make_store_decision(&request(), &resp, 0, after(0)),
            StoreDecision::Yes
        );
    }

    #[rstest]
    #[case(Requester::Main, LoadPriority::Medium)]
    #[case(Requester::Unspecified, LoadPriority::VeryHigh)]
    fn test_store_unconditionally_for_history(
        #[case] requester: Requester,
        #[case] priority: LoadPriority,
    ) {
        let req = request().with_requester(requester).with_priority(priority);
        assert_eq!(
            make_store_decision(&req, &response(200), 0, after(0)),
            StoreDecision::Yes
        );
    }

    // Test: media requester is rejected regardless of freshness
    #[test]
    fn test_store_rejects_media_requester() {
        let req = request().with_requester(Requester::Media);
        let resp = with_cache_control(response(200), "max-age=31536000")
            .with_header(header::ETAG, HeaderValue::from_static("\"v1\""));
        assert_eq!(
            make_store_decision(&req, &resp, 0, after(0)),
            StoreDecision::NoDueToStreamingMedia
        );
    }

    #[rstest]
    #[case(Requester::Xhr, "video/mp4", StoreDecision::NoDueToStreamingMedia)]
    #[case(Requester::Fetch, "audio/mpeg", StoreDecision::NoDueToStreamingMedia)]
    #[case(Requester::Xhr, "application/json", StoreDecision::Yes)]
    #[case(Requester::Unspecified, "video/mp4", StoreDecision::Yes)]
    fn test_store_streaming_media_by_mime(
        #[case] requester: Requester,
        #[case] mime: &'static str,
        #[case] expected: StoreDecision,
    ) {
        let req = request().with_requester(requester);
        let resp = with_cache_control(response(200), "max-age=60")
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static(mime));
        assert_eq!(make_store_decision(&req, &resp, 0, after(0)), expected);
    }

    // ---- speculative revalidation ----

    #[test]
    fn test_can_use_speculative_revalidation() {
        assert!(can_use_speculative_revalidation(&request()));
        assert!(can_use_speculative_revalidation(
            &request().with_cache_policy(CachePolicy::RefreshAnyCacheData)
        ));
        assert!(!can_use_speculative_revalidation(
            &request().with_cache_policy(CachePolicy::ReturnCacheDataElseLoad)
        ));
        assert!(!can_use_speculative_revalidation(
            &request().with_requester(Requester::Fetch)
        ));
        assert!(!can_use_speculative_revalidation(
            &request().with_header(header::IF_NONE_MATCH, HeaderValue::from_static("\"x\""))
        ));
    }

    #[test]
    fn test_decision_names() {
        assert_eq!(RetrieveDecision::NoDueToHttpMethod.to_string(), "NoDueToHTTPMethod");
        assert_eq!(UseDecision::AsyncRevalidate.to_string(), "AsyncRevalidate");
        assert_eq!(StoreDecision::NoDueToHttpStatusCode.to_string(), "NoDueToHTTPStatusCode");
    }
}
