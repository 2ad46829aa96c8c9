//! Destination policy for credential digests: encrypted, or never leaving
//! the machine.

use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid collector url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("collector url {0} has no host")]
    MissingHost(String),
    #[error("refusing unencrypted transport to non-local host {0}")]
    Insecure(String),
}

/// Parses `endpoint` and accepts it only for `https`, or for plain `http`
/// to a loopback host.
pub fn check_endpoint(endpoint: &str) -> Result<Url, TransportError> {
    let url = Url::parse(endpoint).map_err(|source| TransportError::InvalidUrl {
        url: endpoint.to_string(),
        source,
    })?;
    let Some(host) = url.host() else {
        return Err(TransportError::MissingHost(endpoint.to_string()));
    };

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback(&host) => Ok(url),
        _ => Err(TransportError::Insecure(host.to_string())),
    }
}

pub fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => domain.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(addr) => addr.is_loopback(),
        Host::Ipv6(addr) => addr.is_loopback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_http_to_remote_host_is_refused() {
        assert!(matches!(
            check_endpoint("http://example.com"),
            Err(TransportError::Insecure(host)) if host == "example.com"
        ));
    }

    #[test]
    fn encrypted_or_local_is_accepted() {
        for endpoint in [
            "https://example.com",
            "http://localhost:8080",
            "http://LOCALHOST",
            "http://127.0.0.1:9000/api",
            "http://127.8.9.10",
            "http://[::1]:8080",
        ] {
            assert!(check_endpoint(endpoint).is_ok(), "{endpoint}");
        }
    }

    #[test]
    fn other_schemes_and_garbage_are_refused() {
        assert!(matches!(
            check_endpoint("ftp://example.com"),
            Err(TransportError::Insecure(_))
        ));
        assert!(matches!(
            check_endpoint("http://192.168.1.10"),
            Err(TransportError::Insecure(_))
        ));
        assert!(matches!(
            check_endpoint("not a url"),
            Err(TransportError::InvalidUrl { .. })
        ));
    }
}
