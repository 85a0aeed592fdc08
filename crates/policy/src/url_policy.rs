use crate::decision::{DenyReason, PolicyViolation, SecurityDecision};
use ipnet::{Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

const INTERNAL_HOSTNAMES: &[&str] = &["localhost", "metadata.google.internal"];

/// Outbound URL policy: scheme, SSRF and domain lists.
#[derive(Debug, Clone, Default)]
pub struct UrlPolicy {
    allowed_domains: Vec<String>,
    blocked_domains: Vec<String>,
    allow_private_network: bool,
}

impl UrlPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_domains = normalize_domains(domains);
        self
    }

    pub fn with_blocked_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blocked_domains = normalize_domains(domains);
        self
    }

    /// Lets requests reach loopback and private ranges. Only meant for local
    /// testing against a mock server.
    pub fn allow_private_network(mut self, allow: bool) -> Self {
        self.allow_private_network = allow;
        self
    }

    pub fn evaluate(&self, raw: &str) -> SecurityDecision {
        match self.check(raw) {
            Ok(_) => SecurityDecision::Allow,
            Err(violation) => SecurityDecision::Deny(violation),
        }
    }

    /// Parse and vet `raw`, returning the parsed URL when allowed.
    pub fn check(&self, raw: &str) -> Result<Url, PolicyViolation> {
        let url = Url::parse(raw.trim()).map_err(|e| {
            PolicyViolation::new(DenyReason::MalformedTarget, format!("Invalid URL '{}': {}", raw, e))
        })?;

        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(PolicyViolation::new(
                DenyReason::SsrfSuspected,
                format!("Scheme not allowed: {}", url.scheme()),
            ));
        }

        let host = url.host().ok_or_else(|| {
            PolicyViolation::new(DenyReason::MalformedTarget, format!("URL has no host: {}", raw))
        })?;

        let domain = match host {
            Host::Ipv4(ip) => {
                self.check_ip(IpAddr::V4(ip))?;
                ip.to_string()
            }
            Host::Ipv6(ip) => {
                self.check_ip(IpAddr::V6(ip))?;
                ip.to_string()
            }
            Host::Domain(name) => {
                let name = name.trim_end_matches('.').to_lowercase();
                if !self.allow_private_network && is_internal_hostname(&name) {
                    return Err(PolicyViolation::new(
                        DenyReason::SsrfSuspected,
                        format!("Internal hostname: {}", name),
                    ));
                }
                name
            }
        };

        if let Some(blocked) = self
            .blocked_domains
            .iter()
            .find(|d| domain_matches(&domain, d))
        {
            return Err(PolicyViolation::new(
                DenyReason::BlockedDomain,
                format!("Domain is blocked: {}", blocked),
            ));
        }

        if !self.allowed_domains.is_empty()
            && !self.allowed_domains.iter().any(|d| domain_matches(&domain, d))
        {
            return Err(PolicyViolation::new(
                DenyReason::DomainNotAllowed,
                format!("Domain not in allowed list: {}", domain),
            ));
        }

        Ok(url)
    }

    /// Vet the addresses a hostname resolved to. Every address must be public.
    pub fn evaluate_resolved(&self, addrs: &[IpAddr]) -> SecurityDecision {
        for ip in addrs {
            if let Err(violation) = self.check_ip(*ip) {
                return SecurityDecision::Deny(violation);
            }
        }
        SecurityDecision::Allow
    }

    fn check_ip(&self, ip: IpAddr) -> Result<(), PolicyViolation> {
        if self.allow_private_network || !is_non_public(ip) {
            return Ok(());
        }
        Err(PolicyViolation::new(
            DenyReason::SsrfSuspected,
            format!("Address is not publicly routable: {}", ip),
        ))
    }
}

fn normalize_domains<I, S>(domains: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    domains
        .into_iter()
        .map(|d| d.as_ref().trim().trim_end_matches('.').to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

/// `host` equals `domain` or is a subdomain of it. `notmalware.com` does not
/// match `malware.com`.
pub fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .map(|prefix| prefix.ends_with('.'))
            .unwrap_or(false)
}

fn is_internal_hostname(name: &str) -> bool {
    INTERNAL_HOSTNAMES.iter().any(|h| domain_matches(name, h))
}

/// Loopback, private, link-local, CGNAT, unspecified, broadcast and their IPv6
/// counterparts.
pub fn is_non_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_non_public_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_non_public_v4(mapped);
            }
            is_non_public_v6(v6)
        }
    }
}

fn is_non_public_v4(ip: Ipv4Addr) -> bool {
    const EXTRA_RANGES: &[(Ipv4Addr, u8)] = &[
        (Ipv4Addr::new(0, 0, 0, 0), 8),
        (Ipv4Addr::new(100, 64, 0, 0), 10),
        (Ipv4Addr::new(192, 0, 0, 0), 24),
        (Ipv4Addr::new(198, 18, 0, 0), 15),
    ];

    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || EXTRA_RANGES.iter().any(|(net, prefix)| {
            Ipv4Net::new(*net, *prefix)
                .map(|n| n.contains(&ip))
                .unwrap_or(false)
        })
}

fn is_non_public_v6(ip: Ipv6Addr) -> bool {
    const RANGES: &[(Ipv6Addr, u8)] = &[
        // unique local
        (Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
        // link-local
        (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
    ];

    ip.is_loopback()
        || ip.is_unspecified()
        || RANGES.iter().any(|(net, prefix)| {
            Ipv6Net::new(*net, *prefix)
                .map(|n| n.contains(&ip))
                .unwrap_or(false)
        })
}
