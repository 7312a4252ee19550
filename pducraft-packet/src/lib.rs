//! Packet decoding and encoding library for pducraft
//!
//! A packet is represented as a chain of protocol data units ([`Pdu`]),
//! outermost layer first. Decoding walks the bytes with a bounds-checked
//! cursor and dispatches each payload through a [`LayerRegistry`];
//! serialization writes the chain back, deriving lengths, protocol numbers
//! and checksums from what each layer encapsulates. Supported layers:
//!
//! - **Ethernet II** frames, including 802.3 length frames and padding
//! - **IPv4** packets with options
//! - **IPv6** packets with their extension header chain
//! - **TCP** segments and **UDP** datagrams with pseudo-header checksums
//! - **DNS** messages, with owner names kept as literals or compression
//!   pointers exactly as they appear on the wire
//! - **Raw** payload bytes for everything else
//!
//! # Architecture
//!
//! - [`cursor`] - Bounds-checked byte reader and writer
//! - [`field`] - Bit-field packing helpers
//! - [`pdu`] - The chain, the [`Layer`] sum type and the [`LayerCodec`] trait
//! - [`registry`] - Payload dispatch by EtherType, IP protocol or UDP port
//! - [`builder`] - High-level fluent API for packet construction
//! - [`ethernet`], [`ip`], [`ipv6`], [`tcp`], [`udp`], [`dns`], [`raw`] - Layer codecs
//! - [`checksum`] - Internet checksum calculation utilities
//!
//! # Quick Start
//!
//! ## Decoding a capture
//!
//! ```rust
//! use pducraft_packet::{LayerKind, Pdu, TcpSegment};
//!
//! let frame = [
//!     0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x08, 0x00, // Ethernet
//!     0x45, 0x00, 0x00, 0x28, 0x00, 0x00, 0x40, 0x00, 0x40, 0x06, 0x00, 0x00, // IPv4
//!     10, 0, 0, 1, 10, 0, 0, 2,
//!     0x04, 0xd2, 0x00, 0x50, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, // TCP
//!     0x50, 0x02, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00,
//! ];
//!
//! let pdu = Pdu::decode(LayerKind::Ethernet, &frame).unwrap();
//! assert_eq!(pdu.to_string(), "Ethernet / IPv4 / TCP");
//!
//! let tcp = pdu.find::<TcpSegment>().unwrap();
//! assert_eq!(tcp.destination_port, 80);
//! assert!(tcp.flags.syn);
//! ```
//!
//! ## Building a UDP packet
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use pducraft_core::MacAddr;
//! use pducraft_packet::PacketBuilder;
//!
//! let bytes = PacketBuilder::new()
//!     .ethernet(MacAddr::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]), MacAddr::BROADCAST)
//!     .ipv4(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2))
//!     .udp(12345, 9999)
//!     .payload(vec![0x01, 0x02, 0x03])
//!     .build_bytes()
//!     .unwrap();
//!
//! assert_eq!(bytes.len(), 14 + 20 + 8 + 3);
//! ```
//!
//! ## Decoding DNS
//!
//! DNS is not bound by default; opt in per port:
//!
//! ```rust
//! use pducraft_core::DecodeConfig;
//! use pducraft_packet::{DnsMessage, LayerKind, LayerRegistry, Pdu, UdpDatagram};
//!
//! let query = DnsMessage::new(7).to_bytes().unwrap();
//! let datagram = Pdu::new(UdpDatagram::new(5000, 53))
//!     .with_inner(Pdu::raw(query))
//!     .serialize()
//!     .unwrap();
//!
//! let registry = LayerRegistry::new().with_dns_port(53);
//! let pdu = Pdu::decode_with(LayerKind::Udp, &datagram, &registry, &DecodeConfig::default())
//!     .unwrap();
//! assert_eq!(pdu.find::<DnsMessage>().unwrap().id, 7);
//! ```

pub mod builder;
pub mod checksum;
pub mod cursor;
pub mod dns;
pub mod ethernet;
pub mod field;
pub mod ip;
pub mod ipv6;
pub mod pdu;
pub mod raw;
pub mod registry;
pub mod tcp;
pub mod udp;

// Re-export commonly used types for convenience
pub use builder::PacketBuilder;
pub use checksum::{internet_checksum, transport_checksum, PseudoHeader};
pub use cursor::{ByteReader, ByteWriter};
pub use dns::{DnsMessage, DnsQuestion, DnsResourceRecord, RecordInfo, RecordName};
pub use ethernet::{EtherType, EthernetFrame};
pub use field::BitField;
pub use ip::{IpFlags, Ipv4Packet};
pub use ipv6::{ExtensionHeader, Ipv6Packet};
pub use pdu::{Layer, LayerCodec, LayerKind, Pdu};
pub use raw::RawPayload;
pub use registry::{Binding, Decoder, LayerRegistry};
pub use tcp::{TcpFlags, TcpSegment};
pub use udp::UdpDatagram;
