//! SSRF checks for server-side URL fetches
//!
//! A URL is fetched only if it is http(s), passes the optional host allow-list, and neither its
//! host nor any address it resolves to is loopback, private or otherwise internal.

use std::net::{IpAddr, Ipv6Addr};

use tokio::net::lookup_host;

/// Validate `url` before fetching it from the server.
pub async fn validate_url_for_ssrf(
    url: &str,
    allow_private_ips: bool,
    allowlist: Option<&[String]>,
) -> Result<(), String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err("URL must start with http:// or https://".to_string());
    }

    let parsed_url = reqwest::Url::parse(url).map_err(|e| format!("Invalid URL format: {}", e))?;
    let host = parsed_url
        .host_str()
        .ok_or_else(|| "URL must have a host".to_string())?
        .trim_start_matches('[')
        .trim_end_matches(']');

    if let Some(allowed_domains) = allowlist {
        if !host_in_allowlist(host, allowed_domains) {
            return Err(format!(
                "URL hostname '{}' is not in the allowed list. Allowed domains: {}",
                host,
                allowed_domains.join(", ")
            ));
        }
    }

    if allow_private_ips {
        return Ok(());
    }

    if is_internal_host(host) {
        return Err("Private and internal hosts are not allowed".to_string());
    }

    let port = parsed_url.port_or_known_default().unwrap_or(80);
    match lookup_host((host, port)).await {
        Ok(addrs) => {
            for addr in addrs {
                if is_private_ip(&addr.ip()) {
                    return Err(format!(
                        "Hostname resolves to private/internal IP address: {}",
                        addr.ip()
                    ));
                }
            }
        }
        Err(e) => {
            // The fetch itself will fail on an unresolvable host.
            tracing::warn!(host = %host, error = %e, "Failed to resolve hostname for SSRF validation");
        }
    }

    Ok(())
}

/// Exact match or subdomain match (`cdn.example.com` matches `example.com`).
fn host_in_allowlist(host: &str, allowed_domains: &[String]) -> bool {
    let host = host.to_lowercase();
    allowed_domains.iter().any(|allowed| {
        let allowed = allowed.to_lowercase();
        host == allowed || host.ends_with(&format!(".{}", allowed))
    })
}

/// Hostname or IP literal that must never be fetched, checked without DNS.
fn is_internal_host(host: &str) -> bool {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return is_private_ip(&ip);
    }
    let host = host.to_lowercase();
    host == "localhost"
        || host.ends_with(".localhost")
        || host.ends_with(".local")
        || host.ends_with(".internal")
        || host.ends_with(".corp")
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_multicast()
                || ipv4.is_broadcast()
                || octets[0] == 0
                // 100.64.0.0/10, carrier-grade NAT
                || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        }
        IpAddr::V6(ipv6) => {
            if let Some(mapped) = ipv6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || ipv6.is_multicast()
                || is_ipv6_link_local(ipv6)
                || is_ipv6_unique_local(ipv6)
        }
    }
}

/// fe80::/10
fn is_ipv6_link_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xffc0 == 0xfe80
}

/// fc00::/7
fn is_ipv6_unique_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xfe00 == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_rejects_loopback_and_private_addresses() {
        for url in [
            "http://localhost/image.png",
            "http://127.0.0.1/image.png",
            "http://[::1]/image.png",
            "http://10.0.0.1/image.png",
            "http://172.16.0.1/image.png",
            "http://192.168.1.1/image.png",
            "http://169.254.169.254/latest/meta-data",
            "http://[::ffff:127.0.0.1]/image.png",
        ] {
            assert!(
                validate_url_for_ssrf(url, false, None).await.is_err(),
                "{} should be rejected",
                url
            );
        }
    }

    #[tokio::test]
    async fn test_rejects_internal_hostnames() {
        for url in [
            "http://printer.local/a.png",
            "http://service.internal/a.png",
            "http://build.corp/a.png",
        ] {
            assert!(validate_url_for_ssrf(url, false, None).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_rejects_non_http_schemes() {
        for url in ["file:///etc/passwd", "ftp://example.com/a.png", "gopher://example.com"] {
            assert!(validate_url_for_ssrf(url, false, None).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_private_addresses_allowed_when_configured() {
        assert!(validate_url_for_ssrf("http://127.0.0.1:8080/a.png", true, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_allowlist_applies_even_to_private_addresses() {
        let allowlist = vec!["images.example.com".to_string()];
        assert!(
            validate_url_for_ssrf("http://127.0.0.1/a.png", true, Some(&allowlist))
                .await
                .is_err()
        );
    }

    #[test]
    fn test_host_in_allowlist() {
        let allowlist = vec!["example.com".to_string()];
        assert!(host_in_allowlist("example.com", &allowlist));
        assert!(host_in_allowlist("CDN.Example.com", &allowlist));
        assert!(!host_in_allowlist("evil-example.com", &allowlist));
        assert!(!host_in_allowlist("example.com.evil.net", &allowlist));
    }

    #[test]
    fn test_is_private_ip() {
        assert!(is_private_ip(&IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(is_private_ip(&IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1))));
        assert!(!is_private_ip(&IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
        assert!(is_private_ip(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_private_ip(&IpAddr::V6(Ipv6Addr::UNSPECIFIED)));
        assert!(is_private_ip(&"fd00::1".parse().unwrap()));
        assert!(!is_private_ip(&"2606:4700::1111".parse().unwrap()));
    }
}
