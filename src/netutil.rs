/*!
Network / address utilities for the enumeration engine.

This module centralizes:
- Reserved address-range detection (IPv4 and IPv6)
- Enclosing-CIDR fallbacks for reverse sweeps
- Centered CIDR subset enumeration around a discovered address
*/

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Address blocks that never participate in reverse sweeps.
const RESERVED_V4: [(&str, &str); 12] = [
    ("0.0.0.0", "0.255.255.255"),
    ("10.0.0.0", "10.255.255.255"),
    ("100.64.0.0", "100.127.255.255"),
    ("127.0.0.0", "127.255.255.255"),
    ("169.254.0.0", "169.254.255.255"),
    ("172.16.0.0", "172.31.255.255"),
    ("192.0.0.0", "192.0.0.255"),
    ("192.88.99.0", "192.88.99.255"),
    ("192.168.0.0", "192.168.255.255"),
    ("198.18.0.0", "198.19.255.255"),
    ("224.0.0.0", "239.255.255.255"),
    ("240.0.0.0", "255.255.255.255"),
];

/// Return true if the address sits in a reserved or special-use block.
pub fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => RESERVED_V4.iter().any(|(s, e)| in_range(v4, s, e)),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || is_v6_prefix(v6, 0xfc00, 7)
                || is_v6_prefix(v6, 0xfe80, 10)
                || is_v6_prefix(v6, 0xff00, 8)
                || is_v6_prefix(v6, 0x2001, 16) && v6.segments()[1] == 0x0db8
        }
    }
}

/// An IPv4 or IPv6 network expressed as (network address, prefix length).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub network: IpAddr,
    pub prefix_len: u8,
}

impl Cidr {
    /// Parse "a.b.c.d/n" or "x::/n" notation.
    pub fn parse(s: &str) -> Option<Self> {
        let (addr, len) = s.split_once('/')?;
        let ip: IpAddr = addr.trim().parse().ok()?;
        let prefix_len: u8 = len.trim().parse().ok()?;
        let max = if ip.is_ipv4() { 32 } else { 128 };
        if prefix_len > max {
            return None;
        }
        Some(Self {
            network: mask_addr(ip, prefix_len),
            prefix_len,
        })
    }

    /// The enclosing network around `ip` with the given prefix length.
    pub fn enclosing(ip: IpAddr, prefix_len: u8) -> Self {
        Self {
            network: mask_addr(ip, prefix_len),
            prefix_len,
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => {
                mask_addr(ip, self.prefix_len) == self.network
            }
            _ => false,
        }
    }
}

/// Fallback enclosing CIDR when the ASN cache has no answer: a /18 for
/// IPv4, a /64 for IPv6.
pub fn fallback_cidr(ip: IpAddr) -> Cidr {
    match ip {
        IpAddr::V4(_) => Cidr::enclosing(ip, 18),
        IpAddr::V6(_) => Cidr::enclosing(ip, 64),
    }
}

/// Enumerate a subset of `cidr` of exactly `size` addresses centered on
/// `addr`, clipped to the CIDR bounds. When `addr` is outside the CIDR the
/// subset collapses to `addr` alone.
pub fn cidr_subset(cidr: &Cidr, addr: IpAddr, size: usize) -> Vec<IpAddr> {
    if !cidr.contains(addr) {
        return vec![addr];
    }

    let offset = (size / 2) as u128;
    let base = addr_to_u128(addr);
    let net_start = addr_to_u128(cidr.network);
    let span = cidr_span(cidr);
    let net_end = net_start.saturating_add(span - 1);

    let mut start = base.saturating_sub(offset).max(net_start);
    // Clip the window to the CIDR while keeping its width when possible.
    if net_end - start < size as u128 - 1 {
        start = net_end.saturating_sub(size as u128 - 1).max(net_start);
    }

    let mut out = Vec::with_capacity(size);
    let mut cur = start;
    while out.len() < size && cur <= net_end {
        out.push(u128_to_addr(cur, addr.is_ipv4()));
        cur += 1;
    }
    out
}

fn cidr_span(cidr: &Cidr) -> u128 {
    let host_bits = if cidr.network.is_ipv4() {
        32 - cidr.prefix_len as u32
    } else {
        128 - cidr.prefix_len as u32
    };
    1u128 << host_bits.min(127)
}

fn mask_addr(ip: IpAddr, prefix_len: u8) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = if prefix_len == 0 {
                0
            } else {
                u32::MAX << (32 - prefix_len as u32)
            };
            IpAddr::V4(Ipv4Addr::from(bits & mask))
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = if prefix_len == 0 {
                0
            } else {
                u128::MAX << (128 - prefix_len as u32)
            };
            IpAddr::V6(Ipv6Addr::from(bits & mask))
        }
    }
}

fn addr_to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn u128_to_addr(n: u128, v4: bool) -> IpAddr {
    if v4 {
        IpAddr::V4(Ipv4Addr::from(n as u32))
    } else {
        IpAddr::V6(Ipv6Addr::from(n))
    }
}

/// Lookup of the announced prefix covering an address, fed by prior ASN
/// answers. The sweep generator prefers an announced prefix over the
/// fallback masks.
pub trait AsnCache: Send + Sync {
    fn addr_search(&self, addr: IpAddr) -> Option<Cidr>;
}

/// In-memory `AsnCache` over a list of announced prefixes.
#[derive(Default)]
pub struct MemoryAsnCache {
    prefixes: std::sync::RwLock<Vec<(Cidr, i32)>>,
}

impl MemoryAsnCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, prefix: Cidr, asn: i32) {
        let mut prefixes = self.prefixes.write().expect("asn cache lock");
        if !prefixes.iter().any(|(p, _)| *p == prefix) {
            prefixes.push((prefix, asn));
        }
    }
}

impl AsnCache for MemoryAsnCache {
    fn addr_search(&self, addr: IpAddr) -> Option<Cidr> {
        let prefixes = self.prefixes.read().expect("asn cache lock");
        // Most specific announcement wins.
        prefixes
            .iter()
            .filter(|(p, _)| p.contains(addr))
            .max_by_key(|(p, _)| p.prefix_len)
            .map(|(p, _)| *p)
    }
}

fn is_v6_prefix(ip: Ipv6Addr, seg: u16, bits: u32) -> bool {
    let shift = 16 - bits.min(16);
    (ip.segments()[0] >> shift) == (seg >> shift)
}

fn in_range(ip: Ipv4Addr, start: &str, end: &str) -> bool {
    let s: Ipv4Addr = start.parse().expect("range start");
    let e: Ipv4Addr = end.parse().expect("range end");
    u32::from(ip) >= u32::from(s) && u32::from(ip) <= u32::from(e)
}
