//! User-supplied URL validation and private-network blocking.
//!
//! This is a pattern check on the parsed host. A hostname that resolves to a
//! private address (or rebinds after the check) is not caught here.

use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

use crate::error::{AppError, Result};

#[derive(Clone, Copy, Debug, Default)]
pub struct UrlGuard {
    /// Skip the host check entirely. Meant for local development and tests.
    pub allow_private_hosts: bool,
}

impl UrlGuard {
    pub fn new(allow_private_hosts: bool) -> Self {
        UrlGuard { allow_private_hosts }
    }

    /// Normalize, parse and host-check a raw URL string.
    pub fn validate(&self, raw: &str) -> Result<Url> {
        let url = normalize_url(raw)?;
        self.check(&url)?;
        Ok(url)
    }

    pub fn check(&self, url: &Url) -> Result<()> {
        if self.allow_private_hosts {
            return Ok(());
        }
        match url.host() {
            Some(host) if is_blocked_host(&host) => Err(AppError::ForbiddenHost),
            Some(_) => Ok(()),
            None => Err(AppError::InvalidUrl),
        }
    }
}

/// Redirect target rejected by the guard. Carried inside the client error.
#[derive(Debug, thiserror::Error)]
#[error("redirect to a blocked host: {0}")]
pub struct BlockedRedirect(pub String);

/// Prepends `https://` when no http(s) scheme is present and parses the result.
pub fn normalize_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidUrl);
    }

    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|_| AppError::InvalidUrl)?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::InvalidUrl);
    }
    Ok(url)
}

pub fn is_blocked_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" {
                return true;
            }
            // Non-special schemes can leave dotted quads as domains.
            match domain.parse::<Ipv4Addr>() {
                Ok(ip) => is_blocked_ipv4(ip),
                Err(_) => false,
            }
        }
        Host::Ipv4(ip) => is_blocked_ipv4(*ip),
        Host::Ipv6(ip) => is_blocked_ipv6(*ip),
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    matches!(
        (a, b),
        (0, _) | (10, _) | (127, _) | (169, 254) | (192, 168)
    ) || (a == 172 && (16..=31).contains(&b))
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    // ::ffff:a.b.c.d mapped and deprecated ::a.b.c.d compatible forms
    if let Some(embedded) = ip.to_ipv4() {
        return is_blocked_ipv4(embedded);
    }
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_https_when_scheme_missing() {
        let url = normalize_url("example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");

        let url = normalize_url("  http://example.com/path?q=1 ").unwrap();
        assert_eq!(url.as_str(), "http://example.com/path?q=1");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(normalize_url(""), Err(AppError::InvalidUrl)));
        assert!(matches!(normalize_url("   "), Err(AppError::InvalidUrl)));
        assert!(matches!(normalize_url("https://"), Err(AppError::InvalidUrl)));
        assert!(matches!(normalize_url("http://exa mple.com"), Err(AppError::InvalidUrl)));
    }

    #[test]
    fn blocks_private_and_loopback_hosts() {
        let guard = UrlGuard::default();
        for raw in [
            "localhost",
            "http://LOCALHOST:3000",
            "localhost.",
            "127.0.0.1",
            "http://127.0.0.1:8080",
            "127.10.20.30",
            "10.0.0.1",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "http://[::1]/",
            "http://[fc00::1]/",
            "http://[fd12:3456::1]/",
            "http://[fe80::1]/",
            "http://[::ffff:127.0.0.1]/",
            "http://[::127.0.0.1]/",
            "http://[::10.0.0.1]/",
            "http://[::ffff:169.254.169.254]/",
        ] {
            assert!(
                matches!(guard.validate(raw), Err(AppError::ForbiddenHost)),
                "{} should be blocked",
                raw
            );
        }
    }

    #[test]
    fn allows_public_hosts() {
        let guard = UrlGuard::default();
        for raw in [
            "example.com",
            "https://172.15.0.1",
            "https://172.32.0.1",
            "https://8.8.8.8",
            "https://192.169.0.1",
            "http://[2606:4700::1111]/",
            "https://localhost.example.com",
        ] {
            assert!(guard.validate(raw).is_ok(), "{} should be allowed", raw);
        }
    }

    #[test]
    fn allow_private_skips_host_check() {
        let guard = UrlGuard::new(true);
        assert!(guard.validate("http://127.0.0.1:8080").is_ok());
        assert!(matches!(guard.validate(""), Err(AppError::InvalidUrl)));
    }
}
