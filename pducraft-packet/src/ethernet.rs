//! Ethernet II framing
//!
//! The type/length field doubles as an 802.3 length for values up to 1500;
//! such frames carry their payload as raw bytes of exactly that length.
//! Bytes after the encapsulated packet (minimum-size padding, usually) are
//! kept as the frame's trailer so a decoded frame re-encodes byte for byte.

use crate::cursor::{ByteReader, ByteWriter};
use crate::pdu::{Layer, LayerCodec, LayerKind, Pdu, WriteContext};
use crate::registry::{Binding, Decoder};
use bytes::Bytes;
use pducraft_core::{ethertypes, Error, MacAddr, Result};
use std::fmt;
use tracing::trace;

/// Type/length field of an Ethernet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    /// IPv4 (0x0800)
    IPv4,
    /// ARP (0x0806)
    ARP,
    /// VLAN-tagged frame (0x8100)
    VLAN,
    /// IPv6 (0x86DD)
    IPv6,
    /// 802.3 frame; the field holds the payload length
    LLC,
    Custom(u16),
}

impl EtherType {
    /// Wire value; LLC frames write their payload length instead
    pub fn to_u16(self) -> u16 {
        match self {
            EtherType::IPv4 => ethertypes::IPV4,
            EtherType::ARP => ethertypes::ARP,
            EtherType::VLAN => ethertypes::DOT1Q,
            EtherType::IPv6 => ethertypes::IPV6,
            EtherType::LLC => 0,
            EtherType::Custom(value) => value,
        }
    }

    /// Classify a type/length field
    pub fn from_u16(value: u16) -> Self {
        match value {
            0..=ethertypes::MAX_802_3_LENGTH => EtherType::LLC,
            ethertypes::IPV4 => EtherType::IPv4,
            ethertypes::ARP => EtherType::ARP,
            ethertypes::DOT1Q => EtherType::VLAN,
            ethertypes::IPV6 => EtherType::IPv6,
            value => EtherType::Custom(value),
        }
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtherType::IPv4 => write!(f, "IPv4"),
            EtherType::ARP => write!(f, "ARP"),
            EtherType::VLAN => write!(f, "VLAN"),
            EtherType::IPv6 => write!(f, "IPv6"),
            EtherType::LLC => write!(f, "LLC"),
            EtherType::Custom(value) => write!(f, "0x{:04X}", value),
        }
    }
}

/// Ethernet II header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub destination: MacAddr,
    pub source: MacAddr,
    pub ethertype: EtherType,
    /// Bytes after the encapsulated packet
    pub trailer: Bytes,
}

impl EthernetFrame {
    /// Ethernet header size (dst + src + type/length)
    pub const HEADER_SIZE: usize = 14;

    /// Minimum Ethernet frame size (without FCS)
    pub const MIN_FRAME_SIZE: usize = 60;

    /// A frame whose type is taken from the encapsulated layer on write
    pub fn new(destination: MacAddr, source: MacAddr) -> Self {
        EthernetFrame {
            destination,
            source,
            ethertype: EtherType::Custom(0),
            trailer: Bytes::new(),
        }
    }

    /// Set the type written instead of the payload's
    pub fn with_ethertype(mut self, ethertype: EtherType) -> Self {
        self.ethertype = ethertype;
        self
    }

    /// Size the trailer so a frame carrying `payload_len` bytes reaches
    /// the minimum frame size
    pub fn pad_to_minimum(&mut self, payload_len: usize) {
        let padding = Self::MIN_FRAME_SIZE.saturating_sub(Self::HEADER_SIZE + payload_len);
        self.trailer = Bytes::from(vec![0u8; padding]);
    }
}

impl LayerCodec for EthernetFrame {
    const KIND: LayerKind = LayerKind::Ethernet;

    fn decode(bytes: &[u8], decoder: &mut Decoder<'_>) -> Result<Pdu> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(Error::truncated("Ethernet", Self::HEADER_SIZE, bytes.len()));
        }

        let mut reader = ByteReader::new(bytes);
        let destination = MacAddr(reader.read_array::<6>()?);
        let source = MacAddr(reader.read_array::<6>()?);
        let type_or_length = reader.read::<u16>()?;
        let ethertype = EtherType::from_u16(type_or_length);

        trace!(%destination, %source, %ethertype, "Decoded Ethernet header");

        let payload = reader.rest();
        let inner = if ethertype == EtherType::LLC {
            let length = type_or_length as usize;
            let body = payload.get(..length).ok_or_else(|| {
                Error::truncated("Ethernet", Self::HEADER_SIZE + length, bytes.len())
            })?;
            decoder.raw(body)
        } else {
            decoder.decode_payload(Binding::EtherType(type_or_length), payload)?
        };

        let consumed = inner.as_ref().map_or(0, |inner| inner.size());
        let trailer = Bytes::copy_from_slice(payload.get(consumed..).unwrap_or(&[]));

        let mut pdu = Pdu::new(EthernetFrame {
            destination,
            source,
            ethertype,
            trailer,
        });
        pdu.set_inner(inner.map(|inner| *inner));
        Ok(pdu)
    }

    fn header_size(&self) -> usize {
        Self::HEADER_SIZE
    }

    fn trailer_size(&self) -> usize {
        self.trailer.len()
    }

    fn write_header(&self, writer: &mut ByteWriter, ctx: &WriteContext<'_>) -> Result<()> {
        writer.write_bytes(self.destination.as_bytes())?;
        writer.write_bytes(self.source.as_bytes())?;

        let type_or_length = if self.ethertype == EtherType::LLC {
            let length = ctx.payload_len;
            if length > ethertypes::MAX_802_3_LENGTH as usize {
                return Err(Error::FieldOverflow {
                    field: "802.3 length",
                    value: length,
                });
            }
            length as u16
        } else {
            ctx.ethertype_or(self.ethertype.to_u16())
        };
        writer.write(type_or_length)
    }

    fn write_trailer(
        &self,
        writer: &mut ByteWriter,
        _start: usize,
        _ctx: &WriteContext<'_>,
    ) -> Result<()> {
        writer.write_bytes(&self.trailer)
    }

    fn refresh(&mut self, header: &[u8]) {
        if let Some(field) = header.get(12..14) {
            self.ethertype = EtherType::from_u16(u16::from_be_bytes([field[0], field[1]]));
        }
    }

    fn from_layer(layer: &Layer) -> Option<&Self> {
        match layer {
            Layer::Ethernet(frame) => Some(frame),
            _ => None,
        }
    }

    fn from_layer_mut(layer: &mut Layer) -> Option<&mut Self> {
        match layer {
            Layer::Ethernet(frame) => Some(frame),
            _ => None,
        }
    }
}
