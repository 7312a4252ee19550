//! TCP header codec
//!
//! Options are carried verbatim and the segment payload is always kept as
//! raw bytes. When an IP layer encloses the segment, the checksum is
//! recomputed over the pseudo-header once the payload has been written.

use crate::cursor::{ByteReader, ByteWriter};
use crate::field::BitField;
use crate::pdu::{Layer, LayerCodec, LayerKind, Pdu, WriteContext};
use crate::registry::Decoder;
use pducraft_core::{ip_protocols, Error, Result};
use std::fmt;
use tracing::trace;

const DATA_OFFSET: BitField = BitField::new(4, 4);
const RESERVED: BitField = BitField::new(0, 4);

/// TCP flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    /// FIN - No more data from sender
    pub fin: bool,
    /// SYN - Synchronize sequence numbers
    pub syn: bool,
    /// RST - Reset the connection
    pub rst: bool,
    /// PSH - Push function
    pub psh: bool,
    /// ACK - Acknowledgment field is significant
    pub ack: bool,
    /// URG - Urgent pointer field is significant
    pub urg: bool,
    /// ECE - ECN-Echo
    pub ece: bool,
    /// CWR - Congestion Window Reduced
    pub cwr: bool,
}

impl TcpFlags {
    pub const NONE: TcpFlags = TcpFlags::from_u8(0x00);
    pub const FIN: TcpFlags = TcpFlags::from_u8(0x01);
    pub const SYN: TcpFlags = TcpFlags::from_u8(0x02);
    pub const RST: TcpFlags = TcpFlags::from_u8(0x04);
    pub const ACK: TcpFlags = TcpFlags::from_u8(0x10);
    pub const SYN_ACK: TcpFlags = TcpFlags::from_u8(0x12);
    pub const FIN_ACK: TcpFlags = TcpFlags::from_u8(0x11);
    pub const PSH_ACK: TcpFlags = TcpFlags::from_u8(0x18);

    /// Convert flags to u8 value
    pub const fn to_u8(self) -> u8 {
        (self.fin as u8)
            | (self.syn as u8) << 1
            | (self.rst as u8) << 2
            | (self.psh as u8) << 3
            | (self.ack as u8) << 4
            | (self.urg as u8) << 5
            | (self.ece as u8) << 6
            | (self.cwr as u8) << 7
    }

    /// Parse flags from u8 value
    pub const fn from_u8(value: u8) -> Self {
        TcpFlags {
            fin: value & 0x01 != 0,
            syn: value & 0x02 != 0,
            rst: value & 0x04 != 0,
            psh: value & 0x08 != 0,
            ack: value & 0x10 != 0,
            urg: value & 0x20 != 0,
            ece: value & 0x40 != 0,
            cwr: value & 0x80 != 0,
        }
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.fin, "FIN"),
            (self.syn, "SYN"),
            (self.rst, "RST"),
            (self.psh, "PSH"),
            (self.ack, "ACK"),
            (self.urg, "URG"),
            (self.ece, "ECE"),
            (self.cwr, "CWR"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", set.join(","))
    }
}

/// TCP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgment_number: u32,
    /// Data offset in 32-bit words, derived from the options on write
    pub data_offset: u8,
    /// Reserved bits, including NS
    pub reserved: u8,
    pub flags: TcpFlags,
    pub window_size: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
    /// Options, zero padded to a 4-byte boundary on write
    pub options: Vec<u8>,
}

impl TcpSegment {
    /// Minimum TCP header size (without options)
    pub const MIN_HEADER_SIZE: usize = 20;

    /// Maximum TCP header size (with maximum options)
    pub const MAX_HEADER_SIZE: usize = 60;

    pub fn new(
        source_port: u16,
        destination_port: u16,
        sequence_number: u32,
        acknowledgment_number: u32,
        flags: TcpFlags,
        window_size: u16,
    ) -> Self {
        TcpSegment {
            source_port,
            destination_port,
            sequence_number,
            acknowledgment_number,
            data_offset: 5,
            reserved: 0,
            flags,
            window_size,
            checksum: 0,
            urgent_pointer: 0,
            options: Vec::new(),
        }
    }

    /// Set TCP options, padded to a 4-byte boundary
    pub fn with_options(mut self, mut options: Vec<u8>) -> Self {
        options.resize((options.len() + 3) & !3, 0);
        self.data_offset = ((Self::MIN_HEADER_SIZE + options.len()) / 4) as u8;
        self.options = options;
        self
    }

    /// Set the urgent pointer
    pub fn with_urgent_pointer(mut self, pointer: u16) -> Self {
        self.urgent_pointer = pointer;
        self
    }

    fn options_len(&self) -> usize {
        (self.options.len() + 3) & !3
    }
}

impl LayerCodec for TcpSegment {
    const KIND: LayerKind = LayerKind::Tcp;

    fn decode(bytes: &[u8], decoder: &mut Decoder<'_>) -> Result<Pdu> {
        if bytes.len() < Self::MIN_HEADER_SIZE {
            return Err(Error::truncated("TCP", Self::MIN_HEADER_SIZE, bytes.len()));
        }

        let mut reader = ByteReader::new(bytes);
        let source_port = reader.read::<u16>()?;
        let destination_port = reader.read::<u16>()?;
        let sequence_number = reader.read::<u32>()?;
        let acknowledgment_number = reader.read::<u32>()?;
        let offset_and_reserved = reader.read::<u8>()? as u32;
        let flags = TcpFlags::from_u8(reader.read::<u8>()?);
        let window_size = reader.read::<u16>()?;
        let checksum = reader.read::<u16>()?;
        let urgent_pointer = reader.read::<u16>()?;

        let data_offset = DATA_OFFSET.get(offset_and_reserved) as u8;
        let header_len = data_offset as usize * 4;
        if header_len < Self::MIN_HEADER_SIZE {
            return Err(Error::malformed(
                "TCP",
                format!("data offset {}", data_offset),
            ));
        }
        let options = reader
            .read_bytes(header_len - Self::MIN_HEADER_SIZE)
            .map_err(|_| Error::truncated("TCP", header_len, bytes.len()))?
            .to_vec();

        trace!(
            source_port,
            destination_port,
            %flags,
            options = options.len(),
            "Decoded TCP header"
        );

        let mut pdu = Pdu::new(TcpSegment {
            source_port,
            destination_port,
            sequence_number,
            acknowledgment_number,
            data_offset,
            reserved: RESERVED.get(offset_and_reserved) as u8,
            flags,
            window_size,
            checksum,
            urgent_pointer,
            options,
        });
        pdu.set_inner(decoder.raw(reader.rest()).map(|inner| *inner));
        Ok(pdu)
    }

    fn header_size(&self) -> usize {
        Self::MIN_HEADER_SIZE + self.options_len()
    }

    fn write_header(&self, writer: &mut ByteWriter, ctx: &WriteContext<'_>) -> Result<()> {
        let header_len = self.header_size();
        if header_len > Self::MAX_HEADER_SIZE {
            return Err(Error::FieldOverflow {
                field: "data_offset",
                value: header_len,
            });
        }

        let offset_and_reserved = RESERVED.set(
            DATA_OFFSET.set(0, (header_len / 4) as u32),
            self.reserved as u32,
        );
        let checksum = if ctx.checksum_pseudo().is_some() {
            0
        } else {
            self.checksum
        };

        writer.write(self.source_port)?;
        writer.write(self.destination_port)?;
        writer.write(self.sequence_number)?;
        writer.write(self.acknowledgment_number)?;
        writer.write(offset_and_reserved as u8)?;
        writer.write(self.flags.to_u8())?;
        writer.write(self.window_size)?;
        writer.write(checksum)?;
        writer.write(self.urgent_pointer)?;
        writer.write_bytes(&self.options)?;
        writer.write_zeros(self.options_len() - self.options.len())
    }

    fn write_trailer(
        &self,
        writer: &mut ByteWriter,
        start: usize,
        ctx: &WriteContext<'_>,
    ) -> Result<()> {
        if let Some(pseudo) = ctx.checksum_pseudo() {
            let checksum = pseudo.checksum(ip_protocols::TCP, writer.written_since(start));
            writer.patch_u16(start + 16, checksum)?;
        }
        Ok(())
    }

    fn refresh(&mut self, header: &[u8]) {
        if header.len() < Self::MIN_HEADER_SIZE {
            return;
        }
        self.data_offset = DATA_OFFSET.get(header[12] as u32) as u8;
        self.checksum = u16::from_be_bytes([header[16], header[17]]);
        self.options = header[Self::MIN_HEADER_SIZE..].to_vec();
    }

    fn from_layer(layer: &Layer) -> Option<&Self> {
        match layer {
            Layer::Tcp(tcp) => Some(tcp),
            _ => None,
        }
    }

    fn from_layer_mut(layer: &mut Layer) -> Option<&mut Self> {
        match layer {
            Layer::Tcp(tcp) => Some(tcp),
            _ => None,
        }
    }
}
