//! Request identity
//!
//! Maps URIs to the normalized identifiers rules are keyed on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::UriError;

/// How much of a host participates in a request's identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    /// Effective base domain: `images.example.co.uk` -> `example.co.uk`
    #[default]
    BaseDomain,
    /// The full host, subdomains included
    FullHost,
}

/// Normalized identity of a request endpoint.
///
/// Two URIs belong to the same endpoint iff their identifiers are equal.
/// IP-literal hosts identify as the IP itself regardless of granularity,
/// and non-hierarchical schemes (data:, about:, chrome:, ...) identify as
/// their scheme so rules can target e.g. "any data: URI" uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Domain(String),
    Ip(String),
    Scheme(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Domain(d) => write!(f, "{d}"),
            Identifier::Ip(ip) => write!(f, "{ip}"),
            Identifier::Scheme(s) => write!(f, "{s}:"),
        }
    }
}

impl Identifier {
    /// Base domain this identifier belongs to, when it names a domain.
    pub fn base(&self) -> Option<&str> {
        match self {
            Identifier::Domain(d) => Some(base_domain(d)),
            _ => None,
        }
    }

    /// Sentinel for origins the engine cannot parse (internal browser
    /// pages and the like). Never produced for destinations.
    pub fn internal() -> Self {
        Identifier::Scheme("internal".to_string())
    }
}

/// Schemes whose URIs all share one identity: a rule for the scheme
/// covers every URI under it. `chrome:` is listed explicitly because its
/// URIs carry a host-shaped authority that is not a network host.
const SENTINEL_SCHEMES: &[&str] =
    &["data", "javascript", "about", "chrome", "blob", "view-source", "resource"];

/// Compute the identifier of a URI under the given granularity.
///
/// Deterministic and idempotent: the identifier of an already-normalized
/// host is itself.
pub fn identifier(uri: &str, granularity: Granularity) -> Result<Identifier, UriError> {
    let parsed = url::Url::parse(uri.trim()).map_err(|_| UriError::Malformed(uri.to_string()))?;

    if SENTINEL_SCHEMES.contains(&parsed.scheme()) {
        return Ok(Identifier::Scheme(parsed.scheme().to_string()));
    }

    match parsed.host() {
        // url lowercases and punycodes hosts for us
        Some(url::Host::Domain(host)) => Ok(match granularity {
            Granularity::BaseDomain => Identifier::Domain(base_domain(host).to_string()),
            Granularity::FullHost => Identifier::Domain(host.to_string()),
        }),
        Some(url::Host::Ipv4(ip)) => Ok(Identifier::Ip(ip.to_string())),
        Some(url::Host::Ipv6(ip)) => Ok(Identifier::Ip(ip.to_string())),
        // data:, javascript:, about:, chrome:, blob:, view-source:, mailto:...
        None => Ok(Identifier::Scheme(parsed.scheme().to_string())),
    }
}

/// Identifier of an origin URI, falling back to the internal sentinel when
/// the URI cannot be parsed. Destinations must not use this: a malformed
/// destination is denied, not mapped.
pub fn identifier_or_internal(uri: &str, granularity: Granularity) -> Identifier {
    identifier(uri, granularity).unwrap_or_else(|_| Identifier::internal())
}

/// Whether a destination URI is outside the engine's jurisdiction.
///
/// `javascript:` URIs are never intercepted: the platform does not execute
/// them as a network request when blocked, so blocking them only breaks
/// bookmarklets and inline handlers without stopping anything.
pub fn is_uninterceptable(uri: &str) -> bool {
    let uri = uri.trim_start();
    uri.get(..11).is_some_and(|prefix| prefix.eq_ignore_ascii_case("javascript:"))
}

/// Second-level registries under which third-level names are registrable.
/// Small built-in table covering the common cases; a host not matching any
/// of these keeps its last two labels.
const SECOND_LEVEL_REGISTRIES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "me.uk", "net.uk",
    "co.jp", "ne.jp", "or.jp", "ac.jp",
    "com.au", "net.au", "org.au", "edu.au",
    "co.nz", "net.nz", "org.nz",
    "com.br", "net.br", "org.br",
    "com.cn", "net.cn", "org.cn",
    "co.in", "net.in", "org.in",
    "co.kr", "or.kr",
    "com.mx", "com.ar", "com.tr", "com.tw",
    "co.za", "org.za",
];

/// Effective base domain of a host: the registrable domain plus one label.
pub fn base_domain(host: &str) -> &str {
    let labels: Vec<usize> = host
        .char_indices()
        .filter(|&(_, c)| c == '.')
        .map(|(i, _)| i)
        .collect();

    match labels.len() {
        0 | 1 => host,
        n => {
            let last_two = &host[labels[n - 2] + 1..];
            if !SECOND_LEVEL_REGISTRIES.contains(&last_two) {
                last_two
            } else if n >= 3 {
                &host[labels[n - 3] + 1..]
            } else {
                // the host itself is registrable under a second-level registry
                host
            }
        }
    }
}
