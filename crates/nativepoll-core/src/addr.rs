//! Address normalization.
//!
//! Every address-bearing native call takes the same shape: a 16-byte
//! address, an IPv6 scope id and a port. IPv4 addresses travel as
//! IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`), so a single dual-stack
//! code path serves both families.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Fixed prefix of an IPv4-mapped IPv6 address.
pub const IPV4_MAPPED_IPV6_PREFIX: [u8; 12] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff,
];

/// Normalized socket endpoint as handed to the native layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Endpoint {
    pub address: [u8; 16],
    pub scope_id: u32,
    pub port: u16,
}

/// Embed a 4-byte IPv4 address after the mapped prefix.
#[inline]
#[must_use]
pub fn ipv4_mapped(octets: [u8; 4]) -> [u8; 16] {
    let mut address = [0u8; 16];
    address[..12].copy_from_slice(&IPV4_MAPPED_IPV6_PREFIX);
    address[12..].copy_from_slice(&octets);
    address
}

/// Normalize `addr` into the single native representation.
///
/// IPv6 endpoints pass through with their scope id; IPv4 endpoints are
/// mapped and their scope id is forced to 0.
#[inline]
#[must_use]
pub fn normalize(addr: &SocketAddr) -> Endpoint {
    match addr {
        SocketAddr::V4(v4) => Endpoint {
            address: ipv4_mapped(v4.ip().octets()),
            scope_id: 0,
            port: v4.port(),
        },
        SocketAddr::V6(v6) => Endpoint {
            address: v6.ip().octets(),
            scope_id: v6.scope_id(),
            port: v6.port(),
        },
    }
}

impl Endpoint {
    /// Normalize an IP address with an explicit scope id.
    #[must_use]
    pub fn from_ip(ip: IpAddr, scope_id: u32, port: u16) -> Self {
        match ip {
            IpAddr::V4(v4) => normalize(&SocketAddr::V4(SocketAddrV4::new(v4, port))),
            IpAddr::V6(v6) => normalize(&SocketAddr::V6(SocketAddrV6::new(v6, port, 0, scope_id))),
        }
    }

    /// Returns true if the address carries the IPv4-mapped prefix.
    #[must_use]
    pub fn is_ipv4_mapped(&self) -> bool {
        self.address[..12] == IPV4_MAPPED_IPV6_PREFIX
    }

    /// Back to a std address; mapped addresses come back as IPv4.
    #[must_use]
    pub fn to_socket_addr(&self) -> SocketAddr {
        if self.is_ipv4_mapped() {
            let [a, b, c, d] = [
                self.address[12],
                self.address[13],
                self.address[14],
                self.address[15],
            ];
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), self.port))
        } else {
            SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(self.address),
                self.port,
                0,
                self.scope_id,
            ))
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        normalize(&addr)
    }
}
