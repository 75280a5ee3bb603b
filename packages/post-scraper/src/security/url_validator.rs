//! URL validation for SSRF protection.
//!
//! Every URL the job fetches (the base URL, each request, each redirect
//! target and each asset download) passes through [`UrlValidator`].

use std::collections::HashSet;
use std::net::IpAddr;

use url::{Host, Url};

use crate::error::{SecurityError, SecurityResult};

/// Ranges that never belong to a public forum.
const BLOCKED_RANGES: &[&str] = &[
    "0.0.0.0/8",       // "This" network
    "10.0.0.0/8",      // Private
    "100.64.0.0/10",   // Carrier-grade NAT
    "127.0.0.0/8",     // Loopback
    "169.254.0.0/16",  // Link-local / cloud metadata
    "172.16.0.0/12",   // Private
    "192.0.0.0/24",    // IETF protocol assignments
    "192.0.2.0/24",    // TEST-NET-1
    "192.168.0.0/16",  // Private
    "198.18.0.0/15",   // Benchmarking
    "198.51.100.0/24", // TEST-NET-2
    "203.0.113.0/24",  // TEST-NET-3
    "224.0.0.0/4",     // Multicast
    "240.0.0.0/4",     // Reserved, broadcast
    "::/128",          // IPv6 unspecified
    "::1/128",         // IPv6 loopback
    "fc00::/7",        // IPv6 private
    "fe80::/10",       // IPv6 link-local
    "ff00::/8",        // IPv6 multicast
];

/// URL validator for SSRF protection.
///
/// Validates URLs before fetching to prevent:
/// - Access to internal services (localhost, 127.0.0.1)
/// - Access to private and reserved IP ranges
/// - Access to cloud metadata services (169.254.x)
/// - Non-HTTP(S) schemes (file://, ftp://)
#[derive(Debug, Clone)]
pub struct UrlValidator {
    /// Allowed URL schemes
    allowed_schemes: HashSet<String>,

    /// Blocked hostnames
    blocked_hosts: HashSet<String>,

    /// Blocked CIDR ranges
    blocked_cidrs: Vec<ipnet::IpNet>,

    /// Additional allowed hosts (bypass normal validation)
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    /// Create a new URL validator with default security rules.
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "localhost.localdomain",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs: BLOCKED_RANGES
                .iter()
                .filter_map(|cidr| cidr.parse().ok())
                .collect(),
            allowed_hosts: HashSet::new(),
        }
    }

    /// Add an allowed host (bypasses validation).
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    /// Block an additional host.
    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into());
        self
    }

    /// Block an additional CIDR range.
    pub fn block_cidr(mut self, cidr: ipnet::IpNet) -> Self {
        self.blocked_cidrs.push(cidr);
        self
    }

    fn check_ip(&self, ip: IpAddr) -> SecurityResult<()> {
        let ip = ip.to_canonical();
        if self.blocked_cidrs.iter().any(|cidr| cidr.contains(&ip)) {
            return Err(SecurityError::BlockedCidr(ip.to_string()));
        }
        Ok(())
    }

    /// Validate a URL for safety without touching the network.
    pub fn validate(&self, url: &str) -> SecurityResult<()> {
        let parsed = Url::parse(url)?;
        self.validate_parsed(&parsed)
    }

    fn validate_parsed(&self, parsed: &Url) -> SecurityResult<()> {
        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        let host_str = parsed.host_str().ok_or(SecurityError::NoHost)?;
        if host_str.is_empty() {
            return Err(SecurityError::NoHost);
        }

        // Check allowed hosts first (bypass other checks)
        if self.allowed_hosts.contains(host_str) {
            return Ok(());
        }

        match parsed.host() {
            Some(Host::Ipv4(ip)) => self.check_ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => self.check_ip(IpAddr::V6(ip)),
            Some(Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                if self.blocked_hosts.contains(&domain) || domain.ends_with(".localhost") {
                    return Err(SecurityError::BlockedHost(domain));
                }
                Ok(())
            }
            None => Err(SecurityError::NoHost),
        }
    }

    /// Validate a URL and resolve DNS to check the actual IP.
    ///
    /// This catches DNS rebinding where a public-looking hostname
    /// resolves to an internal IP.
    pub async fn validate_with_dns(&self, url: &str) -> SecurityResult<()> {
        let parsed = Url::parse(url)?;
        self.validate_parsed(&parsed)?;

        let host = match parsed.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            // IP literals were checked above
            _ => return Ok(()),
        };

        if self.allowed_hosts.contains(&host) {
            return Ok(());
        }

        let port = parsed.port_or_known_default().unwrap_or(80);
        let addrs = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| SecurityError::DnsResolution(format!("{}: {}", host, e)))?;

        let mut resolved_any = false;
        for addr in addrs {
            resolved_any = true;
            if let Err(SecurityError::BlockedCidr(ip)) = self.check_ip(addr.ip()) {
                return Err(SecurityError::BlockedCidr(format!(
                    "DNS for {} resolved to blocked IP {}",
                    host, ip
                )));
            }
        }

        if !resolved_any {
            return Err(SecurityError::DnsResolution(format!(
                "{}: no addresses",
                host
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtin_ranges_parse() {
        assert_eq!(UrlValidator::new().blocked_cidrs.len(), BLOCKED_RANGES.len());
    }

    #[test]
    fn test_blocks_localhost() {
        let validator = UrlValidator::new();
        assert!(validator.validate("http://localhost/").is_err());
        assert!(validator.validate("http://127.0.0.1/").is_err());
        assert!(validator.validate("http://[::1]/").is_err());
        assert!(validator.validate("http://forum.localhost/").is_err());
    }

    #[test]
    fn test_blocks_private_ips() {
        let validator = UrlValidator::new();
        assert!(validator.validate("http://10.0.0.1/").is_err());
        assert!(validator.validate("http://172.16.0.1/").is_err());
        assert!(validator.validate("http://192.168.1.1/").is_err());
        assert!(validator.validate("http://100.64.1.1/").is_err());
    }

    #[test]
    fn test_blocks_reserved_ranges() {
        let validator = UrlValidator::new();
        assert!(validator.validate("http://0.0.0.0/").is_err());
        assert!(validator.validate("http://224.0.0.1/").is_err());
        assert!(validator.validate("http://255.255.255.255/").is_err());
        assert!(validator.validate("http://[::ffff:127.0.0.1]/").is_err());
    }

    #[test]
    fn test_blocks_metadata_services() {
        let validator = UrlValidator::new();
        assert!(validator.validate("http://169.254.169.254/").is_err());
        assert!(validator.validate("http://metadata.google.internal/").is_err());
    }

    #[test]
    fn test_blocks_non_http() {
        let validator = UrlValidator::new();
        assert!(validator.validate("file:///etc/passwd").is_err());
        assert!(validator.validate("ftp://example.com/").is_err());
        assert!(validator.validate("not a url").is_err());
    }

    #[test]
    fn test_allows_public_urls() {
        let validator = UrlValidator::new();
        assert!(validator.validate("https://example.com/forum/").is_ok());
        assert!(validator.validate("http://93.184.216.34/").is_ok());
    }

    #[test]
    fn test_allowed_hosts_bypass() {
        let validator = UrlValidator::new().allow_host("localhost");
        assert!(validator.validate("http://localhost/").is_ok());
    }

    #[tokio::test]
    async fn test_dns_check_skipped_for_ip_literals() {
        let validator = UrlValidator::new();
        assert!(validator.validate_with_dns("http://93.184.216.34/").await.is_ok());
        assert!(validator.validate_with_dns("http://10.1.2.3/").await.is_err());
    }

    #[tokio::test]
    async fn test_dns_check_skipped_for_allowed_hosts() {
        let validator = UrlValidator::new().allow_host("forum.test");
        assert!(validator.validate_with_dns("https://forum.test/").await.is_ok());
    }
}
