//! Origins and registrable domains

use serde::{Deserialize, Serialize};
use std::fmt;
use url::{Host, Url};

/// Scheme, host and port of a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecurityOrigin {
    pub scheme: String,
    pub host: String,
    /// Explicit port, `None` when the URL uses the scheme default.
    pub port: Option<u16>,
}

impl SecurityOrigin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Returns `None` for URLs without a host (e.g. `data:`).
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        Some(Self {
            scheme: url.scheme().to_string(),
            host: host.to_ascii_lowercase(),
            port: url.port(),
        })
    }

    /// Parses a serialized origin such as `https://example.com:8443`.
    pub fn parse(origin: &str) -> Option<Self> {
        Url::parse(origin).ok().as_ref().and_then(Self::from_url)
    }
}

impl fmt::Display for SecurityOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

/// The part of a host name under which a party can register names,
/// e.g. `example.co.uk` for `www.example.co.uk`.
///
/// A domain given by the caller is kept as-is apart from case and a trailing
/// dot. Without a public suffix list, `from_url` falls back to the last two
/// DNS labels; IP addresses and single-label hosts are kept whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrableDomain(String);

impl RegistrableDomain {
    pub fn new(domain: impl AsRef<str>) -> Self {
        Self(normalize_host(domain.as_ref()))
    }

    pub fn from_url(url: &Url) -> Option<Self> {
        match url.host()? {
            Host::Domain(domain) => {
                let host = normalize_host(domain);
                let labels: Vec<&str> = host.split('.').collect();
                if labels.len() <= 2 {
                    return Some(Self(host));
                }
                Some(Self(labels[labels.len() - 2..].join(".")))
            }
            Host::Ipv4(addr) => Some(Self(addr.to_string())),
            Host::Ipv6(addr) => Some(Self(addr.to_string())),
        }
    }

    /// Every domain the host of `url` could be registered under, most
    /// specific first: the host itself, then each parent with at least two
    /// labels.
    pub fn candidates_for_url(url: &Url) -> Vec<Self> {
        match url.host() {
            Some(Host::Domain(domain)) => {
                let host = normalize_host(domain);
                let labels: Vec<&str> = host.split('.').collect();
                let last = labels.len().saturating_sub(2);
                (0..=last).map(|i| Self(labels[i..].join("."))).collect()
            }
            Some(Host::Ipv4(addr)) => vec![Self(addr.to_string())],
            Some(Host::Ipv6(addr)) => vec![Self(addr.to_string())],
            None => Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

impl fmt::Display for RegistrableDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_from_url() {
        let url = Url::parse("https://WWW.Example.com/path?q").unwrap();
        let origin = SecurityOrigin::from_url(&url).unwrap();
        assert_eq!(origin, SecurityOrigin::new("https", "www.example.com", None));
        assert_eq!(origin.to_string(), "https://www.example.com");
    }

    #[test]
    fn test_origin_keeps_explicit_port() {
        let origin = SecurityOrigin::parse("http://localhost:8080").unwrap();
        assert_eq!(origin.port, Some(8080));
        assert_eq!(origin.to_string(), "http://localhost:8080");
    }

    #[test]
    fn test_origin_requires_host() {
        let url = Url::parse("data:text/plain,hello").unwrap();
        assert!(SecurityOrigin::from_url(&url).is_none());
    }

    #[test]
    fn test_registrable_domain_from_url_uses_last_two_labels() {
        let url = Url::parse("https://a.b.example.com/").unwrap();
        assert_eq!(RegistrableDomain::from_url(&url).unwrap().as_str(), "example.com");
        assert_eq!(RegistrableDomain::new("localhost").as_str(), "localhost");
    }

    // Test: a caller-supplied domain keeps all its labels
    #[test]
    fn test_registrable_domain_new_keeps_given_domain() {
        assert_eq!(RegistrableDomain::new("bbc.co.uk").as_str(), "bbc.co.uk");
        assert_eq!(RegistrableDomain::new("Example.COM.").as_str(), "example.com");
    }

    #[test]
    fn test_registrable_domain_keeps_ip_addresses() {
        let url = Url::parse("http://192.168.1.20/").unwrap();
        assert_eq!(RegistrableDomain::from_url(&url).unwrap().as_str(), "192.168.1.20");
        assert_eq!(
            RegistrableDomain::candidates_for_url(&url),
            vec![RegistrableDomain::new("192.168.1.20")]
        );
    }

    #[test]
    fn test_candidates_for_url() {
        let url = Url::parse("https://www.bbc.co.uk/news").unwrap();
        let candidates: Vec<String> = RegistrableDomain::candidates_for_url(&url)
            .iter()
            .map(|domain| domain.as_str().to_string())
            .collect();
        assert_eq!(candidates, vec!["www.bbc.co.uk", "bbc.co.uk", "co.uk"]);

        let single = Url::parse("http://localhost:8080/").unwrap();
        assert_eq!(
            RegistrableDomain::candidates_for_url(&single),
            vec![RegistrableDomain::new("localhost")]
        );
        let data = Url::parse("data:text/plain,hello").unwrap();
        assert!(RegistrableDomain::candidates_for_url(&data).is_empty());
    }
}
