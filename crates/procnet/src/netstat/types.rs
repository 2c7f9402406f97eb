//! Core types for socket table scans.
//!
//! This module provides strongly-typed representations of transports,
//! connection states, endpoints and the rows of a scan result.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Transport protocol crossed with address family.
///
/// Each variant corresponds to one kernel table under `/proc/net`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "lowercase"))]
pub enum Transport {
    /// TCP over IPv4.
    Tcp,
    /// TCP over IPv6.
    Tcp6,
    /// UDP over IPv4.
    Udp,
    /// UDP over IPv6.
    Udp6,
    /// UDP-Lite over IPv4.
    UdpLite,
    /// UDP-Lite over IPv6.
    UdpLite6,
    /// Raw IP over IPv4.
    Raw,
    /// Raw IP over IPv6.
    Raw6,
}

impl Transport {
    /// Every transport, in table read order.
    pub const ALL: [Transport; 8] = [
        Self::Tcp,
        Self::Tcp6,
        Self::Udp,
        Self::Udp6,
        Self::UdpLite,
        Self::UdpLite6,
        Self::Raw,
        Self::Raw6,
    ];

    /// Name of the table file under `/proc/net`.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tcp6 => "tcp6",
            Self::Udp => "udp",
            Self::Udp6 => "udp6",
            Self::UdpLite => "udplite",
            Self::UdpLite6 => "udplite6",
            Self::Raw => "raw",
            Self::Raw6 => "raw6",
        }
    }

    /// Whether the table holds IPv6 sockets.
    pub fn is_ipv6(&self) -> bool {
        matches!(
            self,
            Self::Tcp6 | Self::Udp6 | Self::UdpLite6 | Self::Raw6
        )
    }

    /// Whether the transport is connection-oriented (uses the full TCP state machine).
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Tcp | Self::Tcp6)
    }

    /// Decode a numeric state code using this transport's state table.
    ///
    /// Unknown codes decode to [`SocketState::Unknown`].
    pub fn decode_state(&self, code: u8) -> SocketState {
        if self.is_stream() {
            return TcpState::from_code(code)
                .map(SocketState::Tcp)
                .unwrap_or(SocketState::Unknown(code));
        }
        match code {
            1 => SocketState::Established,
            7 => SocketState::Close,
            _ => SocketState::Unknown(code),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// TCP socket states, as numbered by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[repr(u8)]
pub enum TcpState {
    /// Connection established.
    Established = 1,
    /// SYN sent, waiting for matching SYN.
    SynSent = 2,
    /// SYN received, waiting for ACK.
    SynRecv = 3,
    /// FIN sent, waiting for FIN or FIN-ACK.
    FinWait1 = 4,
    /// FIN received, waiting for FIN.
    FinWait2 = 5,
    /// In TIME-WAIT state.
    TimeWait = 6,
    /// Socket is closed.
    Close = 7,
    /// FIN received, close pending.
    CloseWait = 8,
    /// Close wait acknowledged, waiting for FIN.
    LastAck = 9,
    /// Socket is listening.
    Listen = 10,
    /// Both sides sent FIN simultaneously.
    Closing = 11,
    /// New SYN received (request socket).
    NewSynRecv = 12,
}

impl TcpState {
    /// Parse from a raw state code. Returns `None` for codes outside the table.
    pub fn from_code(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Established,
            2 => Self::SynSent,
            3 => Self::SynRecv,
            4 => Self::FinWait1,
            5 => Self::FinWait2,
            6 => Self::TimeWait,
            7 => Self::Close,
            8 => Self::CloseWait,
            9 => Self::LastAck,
            10 => Self::Listen,
            11 => Self::Closing,
            12 => Self::NewSynRecv,
            _ => return None,
        })
    }

    /// Get the state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Established => "ESTABLISHED",
            Self::SynSent => "SYN_SENT",
            Self::SynRecv => "SYN_RECV",
            Self::FinWait1 => "FIN_WAIT1",
            Self::FinWait2 => "FIN_WAIT2",
            Self::TimeWait => "TIME_WAIT",
            Self::Close => "CLOSE",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
            Self::Listen => "LISTEN",
            Self::Closing => "CLOSING",
            Self::NewSynRecv => "NEW_SYN_RECV",
        }
    }
}

/// Connection state of a socket.
///
/// TCP sockets carry the full [`TcpState`]; datagram and raw sockets only
/// ever report established (connected) or closed (unconnected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum SocketState {
    /// TCP state.
    Tcp(TcpState),
    /// Connected datagram/raw socket.
    Established,
    /// Unconnected datagram/raw socket.
    Close,
    /// Code not in the transport's state table.
    Unknown(u8),
}

impl SocketState {
    /// Get the state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tcp(state) => state.name(),
            Self::Established => "ESTABLISHED",
            Self::Close => "CLOSE",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One side of a socket: an IP address and a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Endpoint {
    /// IP address.
    pub ip: IpAddr,
    /// Port number.
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(ip: impl Into<IpAddr>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Unspecified address and port 0: the remote side of a listening or
    /// unbound socket.
    pub fn is_unspecified(&self) -> bool {
        self.ip.is_unspecified() && self.port == 0
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, 0)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        SocketAddr::new(ep.ip, ep.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SocketAddr::from(*self).fmt(f)
    }
}

/// The process owning a socket, as seen at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Process {
    /// Process ID.
    pub pid: u32,
    /// Command name.
    pub name: String,
}

impl Process {
    /// Create a new process record.
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pid, self.name)
    }
}

/// How a scanned network namespace was reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "lowercase"))]
pub enum NamespaceId {
    /// The caller's own namespace.
    Host,
    /// Namespace of a process, through `/proc/<pid>/ns/net`.
    Pid(u32),
    /// Named namespace under the netns run directory.
    Named(String),
}

impl NamespaceId {
    /// Whether this is the caller's own namespace.
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Pid(pid) => write!(f, "{}", pid),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// One decoded row of a socket table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SocketEntry {
    /// Table the entry was read from.
    pub transport: Transport,
    /// Local endpoint.
    pub local: Endpoint,
    /// Remote endpoint.
    pub remote: Endpoint,
    /// Connection state.
    pub state: SocketState,
    /// Send queue depth.
    pub tx_queue: u32,
    /// Receive queue depth.
    pub rx_queue: u32,
    /// Owner user ID.
    pub uid: u32,
    /// Socket inode.
    pub inode: u64,
    /// Owning process, when it could be resolved.
    pub process: Option<Process>,
    /// Namespace the entry was scanned in.
    pub namespace: NamespaceId,
}
