//! Decoding of the hex tokens found in `/proc/net` socket tables.
//!
//! The kernel prints addresses as the raw in-memory words of the socket
//! structure, so byte order follows a fixed convention:
//!
//! - IPv4: 8 hex digits, one 32-bit word printed as a number; the address
//!   bytes are that word in little-endian order (`0100007F` is `127.0.0.1`).
//! - IPv6: 32 hex digits, four such words, each little-endian, in order.
//! - Port: 4 hex digits, big-endian.
//!
//! Parsing accepts either letter case. Encoding always produces the
//! uppercase digits the kernel prints (`%08X`), so decoding then re-encoding
//! a lowercase token yields its uppercase form rather than the input.
//!
//! Everything here is pure: no I/O, no shared state.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::error::{Error, Result};
use super::types::Endpoint;

const IPV4_HEX_LEN: usize = 8;
const IPV6_HEX_LEN: usize = 32;
const PORT_HEX_LEN: usize = 4;

/// Parse a fixed-width run of hex digits.
///
/// `from_str_radix` alone would accept a leading `+`, so the character set is
/// checked first.
fn hex_u32(s: &str, width: usize) -> Result<u32> {
    if s.len() != width || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::malformed(format!(
            "expected {} hex digits, got {:?}",
            width, s
        )));
    }
    u32::from_str_radix(s, 16).map_err(|_| Error::malformed(format!("invalid hex {:?}", s)))
}

/// Decode an 8-digit IPv4 token.
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr> {
    let word = hex_u32(s, IPV4_HEX_LEN)?;
    Ok(Ipv4Addr::from(word.to_le_bytes()))
}

/// Decode a 32-digit IPv6 token.
pub fn parse_ipv6(s: &str) -> Result<Ipv6Addr> {
    if s.len() != IPV6_HEX_LEN {
        return Err(Error::malformed(format!(
            "expected {} hex digits, got {:?}",
            IPV6_HEX_LEN, s
        )));
    }

    let mut octets = [0u8; 16];
    for (i, chunk) in octets.chunks_exact_mut(4).enumerate() {
        let digits = s
            .get(i * IPV4_HEX_LEN..(i + 1) * IPV4_HEX_LEN)
            .ok_or_else(|| Error::malformed(format!("non-ASCII address {:?}", s)))?;
        chunk.copy_from_slice(&hex_u32(digits, IPV4_HEX_LEN)?.to_le_bytes());
    }
    Ok(Ipv6Addr::from(octets))
}

/// Decode an address token of either family, chosen by its length.
pub fn parse_addr(s: &str) -> Result<IpAddr> {
    match s.len() {
        IPV4_HEX_LEN => parse_ipv4(s).map(IpAddr::V4),
        IPV6_HEX_LEN => parse_ipv6(s).map(IpAddr::V6),
        n => Err(Error::malformed(format!(
            "address token has {} digits: {:?}",
            n, s
        ))),
    }
}

/// Decode a 4-digit port token.
pub fn parse_port(s: &str) -> Result<u16> {
    // A 4-digit value always fits in u16
    hex_u32(s, PORT_HEX_LEN).map(|p| p as u16)
}

/// Decode an `ADDRESS:PORT` token.
pub fn parse_endpoint(token: &str) -> Result<Endpoint> {
    let (addr, port) = token
        .split_once(':')
        .ok_or_else(|| Error::malformed(format!("no port separator in {:?}", token)))?;
    Ok(Endpoint::new(parse_addr(addr)?, parse_port(port)?))
}

/// Decode the 2-digit connection state token.
pub fn parse_state(s: &str) -> Result<u8> {
    // A 2-digit value always fits in u8
    hex_u32(s, 2).map(|code| code as u8)
}

/// Encode an IPv4 address in the kernel's table form, uppercase.
pub fn encode_ipv4(addr: Ipv4Addr) -> String {
    format!("{:08X}", u32::from_le_bytes(addr.octets()))
}

/// Encode an IPv6 address in the kernel's table form, uppercase.
pub fn encode_ipv6(addr: Ipv6Addr) -> String {
    addr.octets()
        .chunks_exact(4)
        .map(|w| format!("{:08X}", u32::from_le_bytes([w[0], w[1], w[2], w[3]])))
        .collect()
}

/// Encode an endpoint as an `ADDRESS:PORT` table token.
pub fn encode_endpoint(ep: &Endpoint) -> String {
    let addr = match ep.ip {
        IpAddr::V4(v4) => encode_ipv4(v4),
        IpAddr::V6(v6) => encode_ipv6(v6),
    };
    format!("{}:{:04X}", addr, ep.port)
}
