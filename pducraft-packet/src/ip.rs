//! IPv4 header codec
//!
//! On encode the total length and the header checksum are derived from the
//! chain. The protocol number is written as stored, unless it is left at
//! No Next Header for the payload layer to fill in. The stored checksum is
//! only written verbatim when checksum recomputation is turned off.

use crate::checksum::internet_checksum;
use crate::cursor::{ByteReader, ByteWriter};
use crate::field::BitField;
use crate::pdu::{Layer, LayerCodec, LayerKind, Pdu, WriteContext};
use crate::registry::{Binding, Decoder};
use pducraft_core::{Error, Result};
use std::net::Ipv4Addr;
use tracing::{debug, trace};

const VERSION: BitField = BitField::new(4, 4);
const IHL: BitField = BitField::new(0, 4);
const FLAGS: BitField = BitField::new(13, 3);
const FRAGMENT_OFFSET: BitField = BitField::new(0, 13);

/// IP Flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IpFlags {
    /// Reserved bit (must be 0)
    pub reserved: bool,
    /// Don't Fragment flag
    pub dont_fragment: bool,
    /// More Fragments flag
    pub more_fragments: bool,
}

impl IpFlags {
    /// No flags set
    pub const NONE: IpFlags = IpFlags {
        reserved: false,
        dont_fragment: false,
        more_fragments: false,
    };

    /// Don't Fragment flag set
    pub const DONT_FRAGMENT: IpFlags = IpFlags {
        reserved: false,
        dont_fragment: true,
        more_fragments: false,
    };

    /// Convert to 3-bit value
    pub fn to_u8(self) -> u8 {
        (self.reserved as u8) << 2 | (self.dont_fragment as u8) << 1 | self.more_fragments as u8
    }

    /// Parse from 3-bit value
    pub fn from_u8(value: u8) -> Self {
        IpFlags {
            reserved: value & 0b100 != 0,
            dont_fragment: value & 0b010 != 0,
            more_fragments: value & 0b001 != 0,
        }
    }
}

/// IPv4 header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Packet {
    /// Version (always 4 for IPv4)
    pub version: u8,
    /// Internet Header Length in 32-bit words, derived from the options on
    /// write
    pub ihl: u8,
    pub tos: u8,
    /// Total length (header + data) in bytes
    pub total_length: u16,
    pub identification: u16,
    pub flags: IpFlags,
    /// Fragment offset (in 8-byte blocks)
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    /// Options (if IHL > 5), zero padded to a 4-byte boundary on write
    pub options: Vec<u8>,
}

impl Ipv4Packet {
    /// Minimum IPv4 header size (without options)
    pub const MIN_HEADER_SIZE: usize = 20;

    /// Maximum IPv4 header size (with maximum options)
    pub const MAX_HEADER_SIZE: usize = 60;

    /// Create a header with default values
    pub fn new(source: Ipv4Addr, destination: Ipv4Addr, protocol: u8) -> Self {
        Ipv4Packet {
            version: 4,
            ihl: 5,
            tos: 0,
            total_length: Self::MIN_HEADER_SIZE as u16,
            identification: 0,
            flags: IpFlags::DONT_FRAGMENT,
            fragment_offset: 0,
            ttl: 64,
            protocol,
            checksum: 0,
            source,
            destination,
            options: Vec::new(),
        }
    }

    /// Set the time to live
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the type of service byte
    pub fn with_tos(mut self, tos: u8) -> Self {
        self.tos = tos;
        self
    }

    /// Set the identification field
    pub fn with_identification(mut self, id: u16) -> Self {
        self.identification = id;
        self
    }

    /// Set the fragmentation flags
    pub fn with_flags(mut self, flags: IpFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the fragment offset, in 8-byte units
    pub fn with_fragment_offset(mut self, offset: u16) -> Self {
        self.fragment_offset = offset & 0x1FFF; // Only 13 bits
        self
    }

    /// Set IP options, padded to a 4-byte boundary
    pub fn with_options(mut self, mut options: Vec<u8>) -> Self {
        options.resize((options.len() + 3) & !3, 0);
        self.ihl = ((Self::MIN_HEADER_SIZE + options.len()) / 4) as u8;
        self.options = options;
        self
    }

    /// Whether this packet is a fragment of a larger datagram
    pub fn is_fragment(&self) -> bool {
        self.fragment_offset != 0 || self.flags.more_fragments
    }

    fn options_len(&self) -> usize {
        (self.options.len() + 3) & !3
    }
}

impl LayerCodec for Ipv4Packet {
    const KIND: LayerKind = LayerKind::Ipv4;

    fn decode(bytes: &[u8], decoder: &mut Decoder<'_>) -> Result<Pdu> {
        if bytes.len() < Self::MIN_HEADER_SIZE {
            return Err(Error::truncated(
                "IPv4",
                Self::MIN_HEADER_SIZE,
                bytes.len(),
            ));
        }

        let mut reader = ByteReader::new(bytes);
        let version_ihl = reader.read::<u8>()? as u32;
        let version = VERSION.get(version_ihl) as u8;
        let ihl = IHL.get(version_ihl) as u8;

        if version != 4 {
            return Err(Error::malformed("IPv4", format!("version {}", version)));
        }
        if (ihl as usize) * 4 < Self::MIN_HEADER_SIZE {
            return Err(Error::malformed("IPv4", format!("header length {}", ihl)));
        }

        let header_len = (ihl as usize) * 4;
        if bytes.len() < header_len {
            return Err(Error::truncated("IPv4", header_len, bytes.len()));
        }

        let tos = reader.read::<u8>()?;
        let total_length = reader.read::<u16>()?;
        let identification = reader.read::<u16>()?;
        let flags_and_offset = reader.read::<u16>()? as u32;
        let ttl = reader.read::<u8>()?;
        let protocol = reader.read::<u8>()?;
        let checksum = reader.read::<u16>()?;
        let source = Ipv4Addr::from(reader.read_array::<4>()?);
        let destination = Ipv4Addr::from(reader.read_array::<4>()?);
        let options = reader
            .read_bytes(header_len - Self::MIN_HEADER_SIZE)?
            .to_vec();

        let total = total_length as usize;
        if total < header_len {
            return Err(Error::malformed(
                "IPv4",
                format!("total length {} shorter than header", total),
            ));
        }
        let payload = reader
            .read_bytes(total - header_len)
            .map_err(|_| Error::truncated("IPv4", total, bytes.len()))?;

        let packet = Ipv4Packet {
            version,
            ihl,
            tos,
            total_length,
            identification,
            flags: IpFlags::from_u8(FLAGS.get(flags_and_offset) as u8),
            fragment_offset: FRAGMENT_OFFSET.get(flags_and_offset) as u16,
            ttl,
            protocol,
            checksum,
            source,
            destination,
            options,
        };

        trace!(
            source = %packet.source,
            destination = %packet.destination,
            protocol,
            total_length,
            "Decoded IPv4 header"
        );

        let inner = if packet.is_fragment() {
            debug!(
                identification,
                offset = packet.fragment_offset,
                "IPv4 fragment, keeping payload raw"
            );
            decoder.raw(payload)
        } else {
            decoder.decode_payload(Binding::IpProtocol(protocol), payload)?
        };

        let mut pdu = Pdu::new(packet);
        pdu.set_inner(inner.map(|inner| *inner));
        Ok(pdu)
    }

    fn header_size(&self) -> usize {
        Self::MIN_HEADER_SIZE + self.options_len()
    }

    fn write_header(&self, writer: &mut ByteWriter, ctx: &WriteContext<'_>) -> Result<()> {
        let start = writer.len();
        let header_len = self.header_size();
        if header_len > Self::MAX_HEADER_SIZE {
            return Err(Error::FieldOverflow {
                field: "ihl",
                value: header_len,
            });
        }

        let total = header_len + ctx.payload_len;
        let total_length = u16::try_from(total).map_err(|_| Error::FieldOverflow {
            field: "total_length",
            value: total,
        })?;
        let protocol = ctx.ip_protocol_or(self.protocol);
        let recompute = ctx.config.recompute_checksums;

        let version_ihl = IHL.set(VERSION.set(0, self.version as u32), (header_len / 4) as u32);
        let flags_and_offset = FRAGMENT_OFFSET.set(
            FLAGS.set(0, self.flags.to_u8() as u32),
            self.fragment_offset as u32,
        );

        writer.write(version_ihl as u8)?;
        writer.write(self.tos)?;
        writer.write(total_length)?;
        writer.write(self.identification)?;
        writer.write(flags_and_offset as u16)?;
        writer.write(self.ttl)?;
        writer.write(protocol)?;
        writer.write(if recompute { 0 } else { self.checksum })?;
        writer.write_bytes(&self.source.octets())?;
        writer.write_bytes(&self.destination.octets())?;
        writer.write_bytes(&self.options)?;
        writer.write_zeros(self.options_len() - self.options.len())?;

        if recompute {
            let checksum = internet_checksum(writer.written_since(start));
            writer.patch_u16(start + 10, checksum)?;
        }
        Ok(())
    }

    fn refresh(&mut self, header: &[u8]) {
        if header.len() < Self::MIN_HEADER_SIZE {
            return;
        }
        self.ihl = IHL.get(header[0] as u32) as u8;
        self.total_length = u16::from_be_bytes([header[2], header[3]]);
        self.protocol = header[9];
        self.checksum = u16::from_be_bytes([header[10], header[11]]);
        self.options = header[Self::MIN_HEADER_SIZE..].to_vec();
    }

    fn from_layer(layer: &Layer) -> Option<&Self> {
        match layer {
            Layer::Ipv4(ip) => Some(ip),
            _ => None,
        }
    }

    fn from_layer_mut(layer: &mut Layer) -> Option<&mut Self> {
        match layer {
            Layer::Ipv4(ip) => Some(ip),
            _ => None,
        }
    }
}
