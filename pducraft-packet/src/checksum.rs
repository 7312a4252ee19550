//! Checksum calculations for network packets
//!
//! This module provides the Internet Checksum (RFC 1071) used in IPv4, TCP
//! and UDP headers, plus the pseudo-header variants for transport checksums
//! over IPv4 and IPv6.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Adds `data` to a running one's complement sum, as 16-bit big-endian words.
///
/// An odd trailing byte is padded with a zero byte. The returned sum is
/// folded to 16 bits.
pub fn checksum_accumulate(initial: u32, data: &[u8]) -> u32 {
    let mut sum = initial;

    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        // Fold early so long buffers cannot overflow
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum += (byte as u32) << 8;
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    sum
}

/// Calculates the Internet Checksum as defined in RFC 1071.
///
/// # Examples
///
/// ```
/// use pducraft_packet::checksum::internet_checksum;
///
/// let data = vec![0x45, 0x00, 0x00, 0x3c];
/// let checksum = internet_checksum(&data);
/// assert_eq!(checksum, !0x453cu16);
/// ```
pub fn internet_checksum(data: &[u8]) -> u16 {
    !(checksum_accumulate(0, data) as u16)
}

/// Validates an Internet checksum.
///
/// The checksum over data that already contains its checksum field is
/// zero when the field is correct.
pub fn validate_checksum(data: &[u8]) -> bool {
    let result = internet_checksum(data);
    result == 0 || result == 0xFFFF
}

/// The addresses a transport checksum covers, taken from the enclosing IP
/// header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHeader {
    V4 { source: Ipv4Addr, destination: Ipv4Addr },
    V6 { source: Ipv6Addr, destination: Ipv6Addr },
}

impl PseudoHeader {
    /// Checksum of a TCP or UDP header plus payload (`data`, with its
    /// checksum field zeroed) under this pseudo-header
    pub fn checksum(&self, protocol: u8, data: &[u8]) -> u16 {
        match self {
            PseudoHeader::V4 {
                source,
                destination,
            } => transport_checksum(&source.octets(), &destination.octets(), protocol, data),
            PseudoHeader::V6 {
                source,
                destination,
            } => transport_checksum_v6(source, destination, protocol, data),
        }
    }
}

/// Calculates the checksum for a TCP or UDP packet including the IPv4
/// pseudo-header.
///
/// # Examples
///
/// ```
/// use pducraft_packet::checksum::transport_checksum;
///
/// let src_ip = [192, 168, 1, 1];
/// let dst_ip = [192, 168, 1, 2];
/// let protocol = 17; // UDP
/// let data = vec![0x00, 0x35, 0x00, 0x35, 0x00, 0x08, 0x00, 0x00];
/// let checksum = transport_checksum(&src_ip, &dst_ip, protocol, &data);
/// assert_ne!(checksum, 0);
/// ```
pub fn transport_checksum(src_ip: &[u8; 4], dst_ip: &[u8; 4], protocol: u8, data: &[u8]) -> u16 {
    let mut sum = checksum_accumulate(0, src_ip);
    sum = checksum_accumulate(sum, dst_ip);
    sum = checksum_accumulate(sum, &[0, protocol]);
    sum = checksum_accumulate(sum, &(data.len() as u16).to_be_bytes());
    sum = checksum_accumulate(sum, data);
    !(sum as u16)
}

/// Calculates a TCP/UDP checksum over the RFC 8200 IPv6 pseudo-header.
pub fn transport_checksum_v6(src: &Ipv6Addr, dst: &Ipv6Addr, protocol: u8, data: &[u8]) -> u16 {
    let mut sum = checksum_accumulate(0, &src.octets());
    sum = checksum_accumulate(sum, &dst.octets());
    sum = checksum_accumulate(sum, &(data.len() as u32).to_be_bytes());
    sum = checksum_accumulate(sum, &[0, 0, 0, protocol]);
    sum = checksum_accumulate(sum, data);
    !(sum as u16)
}
