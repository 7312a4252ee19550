//! UDP datagram codec
//!
//! The payload is dispatched on the destination port first and then the
//! source port, so both directions of a bound service decode alike.

use crate::cursor::{ByteReader, ByteWriter};
use crate::pdu::{Layer, LayerCodec, LayerKind, Pdu, WriteContext};
use crate::registry::{Binding, Decoder};
use pducraft_core::{ip_protocols, Error, Result};
use tracing::trace;

/// UDP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub source_port: u16,
    pub destination_port: u16,
    /// Length (header + data), derived from the payload on write
    pub length: u16,
    pub checksum: u16,
    /// A disabled checksum is sent as zero
    pub checksum_enabled: bool,
}

impl UdpDatagram {
    /// UDP header size in bytes
    pub const HEADER_SIZE: usize = 8;

    /// Datagram with checksums enabled; length and checksum are derived on write
    pub fn new(source_port: u16, destination_port: u16) -> Self {
        UdpDatagram {
            source_port,
            destination_port,
            length: Self::HEADER_SIZE as u16,
            checksum: 0,
            checksum_enabled: true,
        }
    }

    /// Send the datagram with a zero checksum
    pub fn without_checksum(mut self) -> Self {
        self.checksum_enabled = false;
        self.checksum = 0;
        self
    }
}

impl LayerCodec for UdpDatagram {
    const KIND: LayerKind = LayerKind::Udp;

    fn decode(bytes: &[u8], decoder: &mut Decoder<'_>) -> Result<Pdu> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(Error::truncated("UDP", Self::HEADER_SIZE, bytes.len()));
        }

        let mut reader = ByteReader::new(bytes);
        let source_port = reader.read::<u16>()?;
        let destination_port = reader.read::<u16>()?;
        let length = reader.read::<u16>()?;
        let checksum = reader.read::<u16>()?;

        if (length as usize) < Self::HEADER_SIZE {
            return Err(Error::malformed("UDP", format!("length {}", length)));
        }
        if length as usize > bytes.len() {
            return Err(Error::truncated("UDP", length as usize, bytes.len()));
        }

        trace!(source_port, destination_port, length, "Decoded UDP header");

        let payload = &bytes[Self::HEADER_SIZE..length as usize];
        let inner = decoder.decode_payload_any(
            &[
                Binding::UdpPort(destination_port),
                Binding::UdpPort(source_port),
            ],
            payload,
        )?;

        let mut pdu = Pdu::new(UdpDatagram {
            source_port,
            destination_port,
            length,
            checksum,
            checksum_enabled: checksum != 0,
        });
        pdu.set_inner(inner.map(|inner| *inner));
        Ok(pdu)
    }

    fn header_size(&self) -> usize {
        Self::HEADER_SIZE
    }

    fn write_header(&self, writer: &mut ByteWriter, ctx: &WriteContext<'_>) -> Result<()> {
        let length = Self::HEADER_SIZE + ctx.payload_len;
        if length > u16::MAX as usize {
            return Err(Error::FieldOverflow {
                field: "length",
                value: length,
            });
        }

        let checksum = if !self.checksum_enabled || ctx.checksum_pseudo().is_some() {
            0
        } else {
            self.checksum
        };

        writer.write(self.source_port)?;
        writer.write(self.destination_port)?;
        writer.write(length as u16)?;
        writer.write(checksum)
    }

    fn write_trailer(
        &self,
        writer: &mut ByteWriter,
        start: usize,
        ctx: &WriteContext<'_>,
    ) -> Result<()> {
        if !self.checksum_enabled {
            return Ok(());
        }
        if let Some(pseudo) = ctx.checksum_pseudo() {
            let checksum = match pseudo.checksum(ip_protocols::UDP, writer.written_since(start)) {
                // Zero on the wire means "no checksum"
                0 => 0xFFFF,
                sum => sum,
            };
            writer.patch_u16(start + 6, checksum)?;
        }
        Ok(())
    }

    fn refresh(&mut self, header: &[u8]) {
        if header.len() < Self::HEADER_SIZE {
            return;
        }
        self.length = u16::from_be_bytes([header[4], header[5]]);
        self.checksum = u16::from_be_bytes([header[6], header[7]]);
        self.checksum_enabled = self.checksum != 0;
    }

    fn from_layer(layer: &Layer) -> Option<&Self> {
        match layer {
            Layer::Udp(udp) => Some(udp),
            _ => None,
        }
    }

    fn from_layer_mut(layer: &mut Layer) -> Option<&mut Self> {
        match layer {
            Layer::Udp(udp) => Some(udp),
            _ => None,
        }
    }
}
