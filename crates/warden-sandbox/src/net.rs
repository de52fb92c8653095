//! Address and host rules for outbound requests.
//!
//! An IPv6 address that embeds an IPv4 address (mapped, compatible, NAT64,
//! 6to4, Teredo) is judged by the embedded IPv4 address as well as by the
//! IPv6 rules.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Cloud metadata endpoints, by name or literal address.
pub const METADATA_HOSTS: &[&str] = &[
    "metadata.google.internal",
    "metadata.goog",
    "metadata",
    "metadata.azure.com",
    "instance-data",
    "instance-data.ec2.internal",
    "169.254.169.254",
    "169.254.170.2",
    "100.100.100.200",
    "fd00:ec2::254",
];

/// Whether `ip` is a public unicast address.
#[must_use]
pub fn is_safe_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_safe_ipv4(v4),
        IpAddr::V6(v6) => {
            if let Some(embedded) = embedded_ipv4(v6)
                && !is_safe_ipv4(embedded)
            {
                return false;
            }
            is_safe_ipv6(v6)
        },
    }
}

fn is_safe_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    let blocked = a == 0                              // 0.0.0.0/8
        || a == 10                                    // 10.0.0.0/8
        || (a == 100 && (64..=127).contains(&b))      // 100.64.0.0/10
        || a == 127                                   // 127.0.0.0/8
        || (a == 169 && b == 254)                     // 169.254.0.0/16
        || (a == 172 && (16..=31).contains(&b))       // 172.16.0.0/12
        || (a == 192 && b == 0 && c == 0)             // 192.0.0.0/24
        || (a == 192 && b == 168)                     // 192.168.0.0/16
        || (a == 198 && (18..=19).contains(&b))       // 198.18.0.0/15
        || a >= 224; // 224.0.0.0/4, 240.0.0.0/4, broadcast
    !blocked
}

fn is_safe_ipv6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let blocked = ip.is_unspecified()
        || ip.is_loopback()
        || (first & 0xffc0) == 0xfe80 // link-local fe80::/10
        || (first & 0xffc0) == 0xfec0 // site-local fec0::/10
        || (first & 0xfe00) == 0xfc00 // unique local fc00::/7
        || (first & 0xff00) == 0xff00; // multicast ff00::/8
    !blocked
}

/// The IPv4 address carried inside `ip`, if it uses a known embedding.
#[must_use]
pub fn embedded_ipv4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let s = ip.segments();
    let low32 = |hi: u16, lo: u16| {
        let [a, b] = hi.to_be_bytes();
        let [c, d] = lo.to_be_bytes();
        Ipv4Addr::new(a, b, c, d)
    };

    // ::ffff:a.b.c.d (mapped) and ::a.b.c.d (compatible)
    if s[..5].iter().all(|&x| x == 0) && (s[5] == 0xffff || s[5] == 0) {
        if s[5] == 0 && s[6] == 0 {
            // :: and ::1 are plain IPv6 addresses.
            return None;
        }
        return Some(low32(s[6], s[7]));
    }
    // 64:ff9b::a.b.c.d (NAT64 well-known prefix)
    if s[0] == 0x0064 && s[1] == 0xff9b && s[2..6].iter().all(|&x| x == 0) {
        return Some(low32(s[6], s[7]));
    }
    // 2002:AABB:CCDD::/48 (6to4)
    if s[0] == 0x2002 {
        return Some(low32(s[1], s[2]));
    }
    // 2001:0000:server:...:client (Teredo); the client address is inverted.
    if s[0] == 0x2001 && s[1] == 0 {
        let client = low32(!s[6], !s[7]);
        let server = low32(s[2], s[3]);
        return Some(if is_safe_ipv4(server) { client } else { server });
    }
    None
}

/// Whether `host` (a name or an address literal) is a metadata endpoint.
///
/// Names compare case-insensitively and ignore a trailing dot; IPv6
/// literals may be bracketed.
#[must_use]
pub fn is_metadata_host(host: &str, extra: &[String]) -> bool {
    let normalized = host
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();

    if let Ok(ip) = normalized.parse::<IpAddr>() {
        return is_metadata_ip(ip);
    }
    METADATA_HOSTS
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
        .any(|blocked| blocked.eq_ignore_ascii_case(&normalized))
}

/// Whether `ip` is a metadata endpoint, directly or embedded.
#[must_use]
pub fn is_metadata_ip(ip: IpAddr) -> bool {
    let listed = |candidate: IpAddr| {
        METADATA_HOSTS
            .iter()
            .filter_map(|h| h.parse::<IpAddr>().ok())
            .any(|m| m == candidate)
    };
    match ip {
        IpAddr::V4(_) => listed(ip),
        IpAddr::V6(v6) => listed(ip) || embedded_ipv4(v6).is_some_and(|v4| listed(IpAddr::V4(v4))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn public_addresses_are_safe() {
        for s in ["8.8.8.8", "1.1.1.1", "93.184.216.34", "2001:4860:4860::8888", "2606:4700::1111"] {
            assert!(is_safe_ip(ip(s)), "{s}");
        }
    }

    #[test]
    fn private_ipv4_ranges_are_blocked() {
        for s in [
            "0.0.0.0",
            "0.255.255.255",
            "10.0.0.1",
            "100.64.0.1",
            "100.127.255.255",
            "127.0.0.1",
            "127.255.255.254",
            "169.254.169.254",
            "172.16.0.1",
            "172.31.255.255",
            "192.0.0.170",
            "192.168.1.1",
            "198.18.0.1",
            "198.19.255.255",
            "224.0.0.1",
            "240.0.0.1",
            "255.255.255.255",
        ] {
            assert!(!is_safe_ip(ip(s)), "{s}");
        }
        assert!(is_safe_ip(ip("172.32.0.1")));
        assert!(is_safe_ip(ip("100.128.0.1")));
        assert!(is_safe_ip(ip("198.20.0.1")));
    }

    #[test]
    fn private_ipv6_ranges_are_blocked() {
        for s in ["::", "::1", "fe80::1", "fec0::1", "fc00::1", "fd00::1", "ff02::1"] {
            assert!(!is_safe_ip(ip(s)), "{s}");
        }
    }

    #[test]
    fn embedded_ipv4_forms_are_blocked() {
        for s in [
            "::ffff:127.0.0.1",
            "::ffff:10.0.0.1",
            "::ffff:169.254.169.254",
            "::127.0.0.1",
            "64:ff9b::a9fe:a9fe",       // NAT64 169.254.169.254
            "2002:7f00:0001::1",        // 6to4 127.0.0.1
            "2002:c0a8:0101::1",        // 6to4 192.168.1.1
            "2001:0:4136:e378:8000:63bf:80ff:fffe", // Teredo client 127.0.0.1
        ] {
            assert!(!is_safe_ip(ip(s)), "{s}");
        }
        assert!(is_safe_ip(ip("::ffff:8.8.8.8")));
        assert!(is_safe_ip(ip("2002:0808:0808::1")));
    }

    #[test]
    fn embedded_extraction() {
        assert_eq!(
            embedded_ipv4("::ffff:1.2.3.4".parse().unwrap()),
            Some(Ipv4Addr::new(1, 2, 3, 4))
        );
        assert_eq!(
            embedded_ipv4("2001:0:4136:e378:8000:63bf:80ff:fffe".parse().unwrap()),
            Some(Ipv4Addr::new(127, 0, 0, 1))
        );
        assert_eq!(embedded_ipv4("::1".parse().unwrap()), None);
        assert_eq!(embedded_ipv4("2606:4700::1111".parse().unwrap()), None);
    }

    #[test]
    fn metadata_hosts() {
        assert!(is_metadata_host("169.254.169.254", &[]));
        assert!(is_metadata_host("Metadata.Google.Internal.", &[]));
        assert!(is_metadata_host("[fd00:ec2::254]", &[]));
        assert!(is_metadata_host("::ffff:169.254.169.254", &[]));
        assert!(is_metadata_host("vault.corp", &["vault.corp".to_string()]));
        assert!(!is_metadata_host("example.com", &[]));
        assert!(!is_metadata_host("127.0.0.1", &[]));
    }
}
