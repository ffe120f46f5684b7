use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Check if an IPv4 address falls within a network/prefix.
/// prefix=0 matches all. prefix>32 matches none.
pub fn ip4_in_network(ip: Ipv4Addr, network: Ipv4Addr, prefix: u32) -> bool {
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
pub fn ip6_in_network(ip: Ipv6Addr, network: Ipv6Addr, prefix: u32) -> bool {
    if prefix == 0 {
        return true;
    }
    if prefix > 128 {
        return false;
    }
    let mask = !0u128 << (128 - prefix);
    (u128::from(ip) & mask) == (u128::from(network) & mask)
}

/// Family-aware match of `ip` against `network`.
///
/// Addresses of different families never match. With no prefix for the
/// family the addresses must be equal.
pub fn ip_in_network(ip: IpAddr, network: IpAddr, prefix4: Option<u32>, prefix6: Option<u32>) -> bool {
    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => ip4_in_network(ip, net, prefix4.unwrap_or(32)),
        (IpAddr::V6(ip), IpAddr::V6(net)) => ip6_in_network(ip, net, prefix6.unwrap_or(128)),
        _ => false,
    }
}
