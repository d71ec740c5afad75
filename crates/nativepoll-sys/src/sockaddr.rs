//! Conversion between [`Endpoint`] and the kernel's socket address structs.

use std::mem;

use nativepoll_core::Endpoint;
use nativepoll_core::addr::ipv4_mapped;

pub(crate) const SOCKADDR_IN6_LEN: libc::socklen_t = mem::size_of::<libc::sockaddr_in6>() as _;
pub(crate) const SOCKADDR_STORAGE_LEN: libc::socklen_t =
    mem::size_of::<libc::sockaddr_storage>() as _;

pub(crate) fn to_sockaddr_in6(ep: &Endpoint) -> libc::sockaddr_in6 {
    // SAFETY: sockaddr_in6 is plain old data; all-zero is a valid value.
    let mut sa: libc::sockaddr_in6 = unsafe { mem::zeroed() };
    sa.sin6_family = libc::AF_INET6 as libc::sa_family_t;
    sa.sin6_port = ep.port.to_be();
    sa.sin6_addr.s6_addr = ep.address;
    sa.sin6_scope_id = ep.scope_id;
    sa
}

pub(crate) fn zeroed_storage() -> libc::sockaddr_storage {
    // SAFETY: sockaddr_storage is plain old data; all-zero is a valid value.
    unsafe { mem::zeroed() }
}

/// Decode an address the kernel wrote into `storage`. `None` for families
/// other than `AF_INET`/`AF_INET6`.
pub(crate) fn from_storage(storage: &libc::sockaddr_storage) -> Option<Endpoint> {
    match i32::from(storage.ss_family) {
        libc::AF_INET6 => {
            // SAFETY: the family tag says the storage holds a sockaddr_in6,
            // and sockaddr_storage is large and aligned enough for it.
            let sa = unsafe { &*(storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in6>() };
            Some(Endpoint {
                address: sa.sin6_addr.s6_addr,
                scope_id: sa.sin6_scope_id,
                port: u16::from_be(sa.sin6_port),
            })
        }
        libc::AF_INET => {
            // SAFETY: as above, for sockaddr_in.
            let sa = unsafe { &*(storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in>() };
            Some(Endpoint {
                address: ipv4_mapped(sa.sin_addr.s_addr.to_ne_bytes()),
                scope_id: 0,
                port: u16::from_be(sa.sin_port),
            })
        }
        _ => None,
    }
}
