//! Socket construction and address helpers underneath the meter client
//! and discovery.

use std::ffi::CStr;
use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::{Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::str::FromStr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

/// A UDP socket suitable for receiving broadcast or multicast
/// announcements: `SO_BROADCAST` and `SO_REUSEADDR` set, an optional
/// receive timeout, optionally joined to `multicast_group` on any
/// interface, bound to `0.0.0.0:port`.
///
/// Intermediate failures drop the partially configured socket.
pub fn udp_broadcast_socket(
    port: u16,
    timeout: Option<Duration>,
    multicast_group: Option<Ipv4Addr>,
) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_reuse_address(true)?;
    socket.set_read_timeout(timeout)?;

    if let Some(group) = multicast_group {
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;

    Ok(socket.into())
}

/// Connect a TCP client socket to `host:service`, trying each resolved
/// address in order and applying `timeout` as the receive timeout of the
/// first that connects.
pub fn tcp_client_socket(
    host: &str,
    service: &str,
    timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    let mut last_error = None;

    for addr in (host, parse_service(service)?).to_socket_addrs()? {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                stream.set_read_timeout(timeout)?;
                debug!("connected to {addr}");
                return Ok(stream);
            }
            Err(e) => {
                debug!("connecting to {addr}: {e}");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address found for {host}:{service}"),
        )
    }))
}

fn parse_service(service: &str) -> io::Result<u16> {
    service
        .parse::<u16>()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("bad port: {service}")))
}

/// A local IPv4 interface address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub addr: Ipv4Addr,
}

/// Enumerate the IPv4 addresses of all local interfaces.
pub fn interfaces() -> io::Result<Vec<Interface>> {
    let mut ifap: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut ifap) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut out = Vec::new();
    let mut entry = ifap;
    while !entry.is_null() {
        // SAFETY: getifaddrs returned a valid list that lives until the
        // matching freeifaddrs below
        let ifaddr = unsafe { &*entry };
        if !ifaddr.ifa_addr.is_null()
            && unsafe { (*ifaddr.ifa_addr).sa_family } == libc::AF_INET as libc::sa_family_t
        {
            let sin = unsafe { &*(ifaddr.ifa_addr as *const libc::sockaddr_in) };
            let name = unsafe { CStr::from_ptr(ifaddr.ifa_name) }
                .to_string_lossy()
                .into_owned();
            out.push(Interface {
                name,
                addr: Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)),
            });
        }
        entry = ifaddr.ifa_next;
    }

    unsafe { libc::freeifaddrs(ifap) };
    Ok(out)
}

/// Whether `addr` is bound to one of the local interfaces.
pub fn is_local_address(addr: Ipv4Addr) -> io::Result<bool> {
    Ok(interfaces()?.iter().any(|iface| iface.addr == addr))
}

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl Display for MacAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');

        for octet in &mut octets {
            let part = parts.next().ok_or(())?;
            if part.is_empty() || part.len() > 2 {
                return Err(());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| ())?;
        }

        if parts.next().is_some() {
            return Err(());
        }
        Ok(MacAddr(octets))
    }
}

/// Resolve an IPv4 address to its hardware address by scanning the
/// kernel ARP cache.
pub fn arp_lookup(addr: Ipv4Addr) -> io::Result<Option<MacAddr>> {
    let arp = File::open("/proc/net/arp")?;
    scan_arp_table(BufReader::new(arp), addr)
}

fn scan_arp_table<R: BufRead>(reader: R, addr: Ipv4Addr) -> io::Result<Option<MacAddr>> {
    for line in reader.lines() {
        let line = line?;

        let mut entry_addr = None;
        let mut entry_mac = None;
        for token in line.split_whitespace() {
            if entry_addr.is_none()
                && let Ok(parsed) = token.parse::<Ipv4Addr>()
            {
                entry_addr = Some(parsed);
                continue;
            }
            if entry_mac.is_none()
                && let Ok(parsed) = token.parse::<MacAddr>()
            {
                entry_mac = Some(parsed);
            }
        }

        if entry_addr == Some(addr) {
            if entry_mac.is_none() {
                warn!("ARP entry for {addr} carries no hardware address");
            }
            return Ok(entry_mac);
        }
    }

    Ok(None)
}
