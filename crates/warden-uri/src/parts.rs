//! URI decomposition
//!
//! Scheme/host/port extraction, pre-path display form, fragment stripping.

use crate::UriError;

/// Decomposed URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriParts {
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Parse a URI into scheme, host and explicit port.
pub fn parse(uri: &str) -> Result<UriParts, UriError> {
    let parsed = url::Url::parse(uri.trim()).map_err(|_| UriError::Malformed(uri.to_string()))?;

    Ok(UriParts {
        scheme: parsed.scheme().to_string(),
        host: parsed.host_str().map(|h| h.to_string()),
        port: parsed.port(),
    })
}

/// Pre-path form of a URI: scheme + host + explicit port, no path.
///
/// Used to shorten URIs for display. Fails for URIs without a host
/// (data:, javascript:, ...), which have no meaningful pre-path.
pub fn base_path(uri: &str) -> Result<String, UriError> {
    let parts = parse(uri)?;
    let host = parts.host.ok_or_else(|| UriError::Malformed(uri.to_string()))?;

    Ok(match parts.port {
        Some(port) => format!("{}://{}:{}", parts.scheme, host, port),
        None => format!("{}://{}", parts.scheme, host),
    })
}

/// Remove the `#fragment` suffix from a URI. Idempotent.
pub fn strip_fragment(uri: &str) -> &str {
    match uri.find('#') {
        Some(pos) => &uri[..pos],
        None => uri,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http() {
        let parts = parse("https://example.com:8080/path?q=1").unwrap();
        assert_eq!(parts.scheme, "https");
        assert_eq!(parts.host.as_deref(), Some("example.com"));
        assert_eq!(parts.port, Some(8080));
    }

    #[test]
    fn test_parse_default_port_is_none() {
        let parts = parse("https://example.com/").unwrap();
        assert_eq!(parts.port, None);
    }

    #[test]
    fn test_parse_hostless_scheme() {
        let parts = parse("data:text/html,hello").unwrap();
        assert_eq!(parts.scheme, "data");
        assert_eq!(parts.host, None);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse("not a uri").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_base_path() {
        assert_eq!(base_path("https://example.com/a/b?c#d").unwrap(), "https://example.com");
        assert_eq!(base_path("http://example.com:81/x").unwrap(), "http://example.com:81");
        assert!(base_path("data:text/plain,x").is_err());
    }

    #[test]
    fn test_strip_fragment() {
        assert_eq!(strip_fragment("https://example.com/page#section"), "https://example.com/page");
        assert_eq!(strip_fragment("https://example.com/page"), "https://example.com/page");
        // Idempotent
        assert_eq!(
            strip_fragment(strip_fragment("https://example.com/#a#b")),
            "https://example.com/"
        );
    }
}
