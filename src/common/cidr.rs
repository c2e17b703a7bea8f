use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Check if an IPv4 address falls within a network/prefix.
/// prefix=0 matches all. prefix>32 matches none.
pub fn ip4_in_network(ip: Ipv4Addr, network: Ipv4Addr, prefix: u8) -> bool {
    if prefix == 0 {
        return true;
    }
    if prefix > 32 {
        return false;
    }
    let mask = !0u32 << (32 - prefix);
    (u32::from(ip) & mask) == (u32::from(network) & mask)
}

/// Check if an IPv6 address falls within a network/prefix.
/// prefix=0 matches all. prefix>128 matches none.
pub fn ip6_in_network(ip: Ipv6Addr, network: Ipv6Addr, prefix: u8) -> bool {
    if prefix == 0 {
        return true;
    }
    if prefix > 128 {
        return false;
    }
    let mask = !0u128 << (128 - prefix);
    (u128::from(ip) & mask) == (u128::from(network) & mask)
}

/// Family-aware containment check. The prefix for the candidate's family is
/// picked from `v4`/`v6`; addresses of different families never match.
pub fn in_network(candidate: IpAddr, network: IpAddr, v4: u8, v6: u8) -> bool {
    match (candidate, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => ip4_in_network(ip, net, v4),
        (IpAddr::V6(ip), IpAddr::V6(net)) => ip6_in_network(ip, net, v6),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn ip4_exact_match() {
        assert!(ip4_in_network(v4("192.168.1.1"), v4("192.168.1.1"), 32));
        assert!(!ip4_in_network(v4("192.168.1.2"), v4("192.168.1.1"), 32));
    }

    #[test]
    fn ip4_slash_8_boundaries() {
        let net = v4("10.0.0.0");
        assert!(ip4_in_network(v4("10.0.0.0"), net, 8));
        assert!(ip4_in_network(v4("10.255.255.255"), net, 8));
        assert!(ip4_in_network(v4("10.20.30.40"), net, 8));
        assert!(!ip4_in_network(v4("9.255.255.255"), net, 8));
        assert!(!ip4_in_network(v4("11.0.0.0"), net, 8));
    }

    #[test]
    fn ip4_prefix_0_matches_all() {
        assert!(ip4_in_network(v4("10.0.0.1"), v4("192.168.1.0"), 0));
    }

    #[test]
    fn ip4_prefix_too_large() {
        let ip = v4("1.2.3.4");
        assert!(!ip4_in_network(ip, ip, 33));
    }

    #[test]
    fn ip6_subnet_match() {
        let net: Ipv6Addr = "2001:db8::".parse().unwrap();
        assert!(ip6_in_network("2001:db8::abcd".parse().unwrap(), net, 32));
        assert!(!ip6_in_network("2001:db9::1".parse().unwrap(), net, 32));
    }

    #[test]
    fn ip6_slash_64_boundary() {
        let net: Ipv6Addr = "2001:db8::".parse().unwrap();
        assert!(ip6_in_network("2001:db8:0:0:ffff::1".parse().unwrap(), net, 64));
        assert!(!ip6_in_network("2001:db8:0:1::1".parse().unwrap(), net, 64));
    }

    #[test]
    fn mixed_families_never_match() {
        let v4net: IpAddr = "10.0.0.0".parse().unwrap();
        let v6ip: IpAddr = "::ffff:10.0.0.1".parse().unwrap();
        assert!(!in_network(v6ip, v4net, 0, 0));
        assert!(in_network("10.1.1.1".parse().unwrap(), v4net, 8, 128));
    }
}
