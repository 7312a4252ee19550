//! IPv6 header codec with its extension header chain
//!
//! Extension headers are kept as an ordered list, each with the next-header
//! byte it carried. On write the chained bytes follow list order: the fixed
//! header points at the first entry, each entry at the one after it, and the
//! last one at the upper-layer protocol.

use crate::cursor::{ByteReader, ByteWriter};
use crate::field::BitField;
use crate::pdu::{Layer, LayerCodec, LayerKind, Pdu, WriteContext};
use crate::registry::{Binding, Decoder};
use pducraft_core::{ip_protocols, Error, Result};
use std::net::Ipv6Addr;
use tracing::{debug, trace};

const VERSION: BitField = BitField::new(28, 4);
const TRAFFIC_CLASS: BitField = BitField::new(20, 8);
const FLOW_LABEL: BitField = BitField::new(0, 20);

const FRAGMENT_OFFSET: BitField = BitField::new(3, 13);
const MORE_FRAGMENTS: BitField = BitField::new(0, 1);

/// Offset word plus identification
const FRAGMENT_DATA_LEN: usize = 6;

/// Whether `kind` is one of the extension headers walked while decoding
pub fn is_extension(kind: u8) -> bool {
    matches!(
        kind,
        ip_protocols::HOP_BY_HOP
            | ip_protocols::ROUTING
            | ip_protocols::FRAGMENT
            | ip_protocols::AUTHENTICATION
            | ip_protocols::DESTINATION_OPTIONS
            | ip_protocols::MOBILITY
    )
}

/// Size unit and bias of the length byte: `size = unit * (len + bias)`
fn length_encoding(kind: u8) -> (usize, usize) {
    if kind == ip_protocols::AUTHENTICATION {
        (4, 2)
    } else {
        (8, 1)
    }
}

/// Fields of a Fragment extension header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentInfo {
    /// Offset in 8-byte units
    pub offset: u16,
    pub more_fragments: bool,
    pub identification: u32,
}

/// One extension header.
///
/// `data` is everything after the next-header and length bytes, padded to
/// the header's size unit. A Fragment header is always 8 bytes; its second
/// byte is reserved, so its data is the offset word and the identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionHeader {
    kind: u8,
    next_header: u8,
    data: Vec<u8>,
}

impl ExtensionHeader {
    /// Smallest extension header on the wire
    pub const MIN_SIZE: usize = 8;

    /// Build a header, zero padding `data` up to the kind's size unit.
    ///
    /// For a Fragment header `data` is cut or padded to its six bytes.
    pub fn new(kind: u8, mut data: Vec<u8>) -> Self {
        let len = if kind == ip_protocols::FRAGMENT {
            FRAGMENT_DATA_LEN
        } else {
            let (unit, _) = length_encoding(kind);
            ((2 + data.len()).div_ceil(unit) * unit).max(Self::MIN_SIZE) - 2
        };
        data.resize(len, 0);
        ExtensionHeader {
            kind,
            next_header: ip_protocols::NO_NEXT_HEADER,
            data,
        }
    }

    /// Fragment header for a fragment at `offset` (in 8-byte units)
    pub fn fragment(offset: u16, more_fragments: bool, identification: u32) -> Self {
        let word = MORE_FRAGMENTS.set(
            FRAGMENT_OFFSET.set(0, offset as u32),
            more_fragments as u32,
        );
        let mut data = (word as u16).to_be_bytes().to_vec();
        data.extend_from_slice(&identification.to_be_bytes());
        ExtensionHeader::new(ip_protocols::FRAGMENT, data)
    }

    /// Extension header type
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// The next-header byte this header carries
    pub fn next_header(&self) -> u8 {
        self.next_header
    }

    /// Option bytes after the next-header and length bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes this header occupies on the wire
    pub fn size(&self) -> usize {
        2 + self.data.len()
    }

    /// Fragment fields, for a Fragment header
    pub fn fragment_info(&self) -> Option<FragmentInfo> {
        if self.kind != ip_protocols::FRAGMENT {
            return None;
        }
        let fields = self.data.get(..FRAGMENT_DATA_LEN)?;
        let word = u16::from_be_bytes([fields[0], fields[1]]) as u32;
        Some(FragmentInfo {
            offset: FRAGMENT_OFFSET.get(word) as u16,
            more_fragments: MORE_FRAGMENTS.get(word) != 0,
            identification: u32::from_be_bytes([fields[2], fields[3], fields[4], fields[5]]),
        })
    }

    /// Read one header of `kind` from the front of `reader`
    fn read(kind: u8, reader: &mut ByteReader<'_>) -> Result<Self> {
        let available = reader.remaining();
        let next_header = reader.read::<u8>()?;
        let len = reader.read::<u8>()? as usize;
        // The Fragment header's second byte is reserved and ignored
        let size = if kind == ip_protocols::FRAGMENT {
            Self::MIN_SIZE
        } else {
            let (unit, bias) = length_encoding(kind);
            unit * (len + bias)
        };
        let data = reader
            .read_bytes(size - 2)
            .map_err(|_| Error::truncated("IPv6", size, available))?
            .to_vec();
        Ok(ExtensionHeader {
            kind,
            next_header,
            data,
        })
    }

    fn write(&self, next: u8, writer: &mut ByteWriter) -> Result<()> {
        let len = if self.kind == ip_protocols::FRAGMENT {
            0
        } else {
            let size = self.size();
            let (unit, bias) = length_encoding(self.kind);
            u8::try_from(size / unit - bias).map_err(|_| Error::FieldOverflow {
                field: "extension header length",
                value: size,
            })?
        };
        writer.write(next)?;
        writer.write(len)?;
        writer.write_bytes(&self.data)
    }
}

/// IPv6 fixed header plus its extension headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Packet {
    /// 4-bit version, 6 unless set otherwise
    pub version: u8,
    pub traffic_class: u8,
    /// 20-bit flow label
    pub flow_label: u32,
    /// Extensions plus payload, derived on write
    pub payload_length: u16,
    /// Next-header value of the fixed header: the first extension header's
    /// type, or the upper-layer protocol when there is none
    pub next_header: u8,
    pub hop_limit: u8,
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
    extension_headers: Vec<ExtensionHeader>,
}

impl Ipv6Packet {
    /// Fixed header size
    pub const HEADER_SIZE: usize = 40;

    /// A header carrying `next_header`.
    ///
    /// [`ip_protocols::NO_NEXT_HEADER`] leaves the protocol to the payload
    /// layer when there is one.
    pub fn new(source: Ipv6Addr, destination: Ipv6Addr, next_header: u8) -> Self {
        Ipv6Packet {
            version: 6,
            traffic_class: 0,
            flow_label: 0,
            payload_length: 0,
            next_header,
            hop_limit: 64,
            source,
            destination,
            extension_headers: Vec::new(),
        }
    }

    /// Set the hop limit
    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    /// Set the traffic class
    pub fn with_traffic_class(mut self, traffic_class: u8) -> Self {
        self.traffic_class = traffic_class;
        self
    }

    /// Set the flow label; bits above the low 20 are dropped
    pub fn with_flow_label(mut self, flow_label: u32) -> Self {
        self.flow_label = flow_label & FLOW_LABEL.max();
        self
    }

    /// Set the version; bits above the low 4 are dropped
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version & VERSION.max() as u8;
        self
    }

    /// Extension headers in wire order
    pub fn extension_headers(&self) -> &[ExtensionHeader] {
        &self.extension_headers
    }

    /// Append an extension header after the existing ones. It takes over
    /// the upper-layer protocol, and the header before it (or the fixed
    /// header) now points at it.
    pub fn add_extension_header(&mut self, mut header: ExtensionHeader) {
        header.next_header = self.upper_layer_protocol();
        match self.extension_headers.last_mut() {
            Some(last) => last.next_header = header.kind,
            None => self.next_header = header.kind,
        }
        self.extension_headers.push(header);
    }

    /// First extension header of `kind`
    pub fn search_option(&self, kind: u8) -> Option<&ExtensionHeader> {
        self.extension_headers.iter().find(|header| header.kind == kind)
    }

    /// Protocol of the payload after the extension chain
    pub fn upper_layer_protocol(&self) -> u8 {
        self.extension_headers
            .last()
            .map_or(self.next_header, |header| header.next_header)
    }

    /// Set the protocol of the payload after the extension chain
    pub fn set_upper_layer_protocol(&mut self, protocol: u8) {
        match self.extension_headers.last_mut() {
            Some(last) => last.next_header = protocol,
            None => self.next_header = protocol,
        }
    }

    /// Wire size of all extension headers
    pub fn extensions_size(&self) -> usize {
        self.extension_headers.iter().map(ExtensionHeader::size).sum()
    }

    /// Whether the extension chain holds a fragment other than a whole
    /// unfragmented packet
    pub fn is_fragment(&self) -> bool {
        self.extension_headers
            .iter()
            .filter_map(ExtensionHeader::fragment_info)
            .any(|info| info.offset != 0 || info.more_fragments)
    }
}

impl LayerCodec for Ipv6Packet {
    const KIND: LayerKind = LayerKind::Ipv6;

    fn decode(bytes: &[u8], decoder: &mut Decoder<'_>) -> Result<Pdu> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(Error::truncated("IPv6", Self::HEADER_SIZE, bytes.len()));
        }

        let mut reader = ByteReader::new(bytes);
        let word = reader.read::<u32>()?;
        let version = VERSION.get(word) as u8;
        if version != 6 {
            debug!(version, "IPv6 header with unexpected version");
        }
        let payload_length = reader.read::<u16>()?;
        let next_header = reader.read::<u8>()?;
        let hop_limit = reader.read::<u8>()?;
        let source = Ipv6Addr::from(reader.read_array::<16>()?);
        let destination = Ipv6Addr::from(reader.read_array::<16>()?);

        let total = Self::HEADER_SIZE + payload_length as usize;
        let region = reader
            .read_bytes(payload_length as usize)
            .map_err(|_| Error::truncated("IPv6", total, bytes.len()))?;

        let limit = decoder.config().max_extension_headers;
        let mut payload = ByteReader::new(region);
        let mut extension_headers = Vec::new();
        let mut upper = next_header;
        while is_extension(upper) && !payload.is_empty() {
            if extension_headers.len() >= limit {
                return Err(Error::ExtensionChainTooLong { limit });
            }
            let header = ExtensionHeader::read(upper, &mut payload)?;
            trace!(kind = header.kind, size = header.size(), "Decoded IPv6 extension header");
            upper = header.next_header;
            extension_headers.push(header);
        }

        let packet = Ipv6Packet {
            version,
            traffic_class: TRAFFIC_CLASS.get(word) as u8,
            flow_label: FLOW_LABEL.get(word),
            payload_length,
            next_header,
            hop_limit,
            source,
            destination,
            extension_headers,
        };

        trace!(
            source = %packet.source,
            destination = %packet.destination,
            next_header,
            upper,
            payload_length,
            extensions = packet.extension_headers.len(),
            "Decoded IPv6 header"
        );

        let inner = if packet.is_fragment() {
            debug!(upper, "IPv6 fragment, keeping payload raw");
            decoder.raw(payload.rest())
        } else {
            decoder.decode_payload(Binding::IpProtocol(upper), payload.rest())?
        };

        let mut pdu = Pdu::new(packet);
        pdu.set_inner(inner.map(|inner| *inner));
        Ok(pdu)
    }

    fn header_size(&self) -> usize {
        Self::HEADER_SIZE + self.extensions_size()
    }

    fn write_header(&self, writer: &mut ByteWriter, ctx: &WriteContext<'_>) -> Result<()> {
        let length = self.extensions_size() + ctx.payload_len;
        let payload_length = u16::try_from(length).map_err(|_| Error::FieldOverflow {
            field: "payload_length",
            value: length,
        })?;
        let upper = ctx.ip_protocol_or(self.upper_layer_protocol());

        let word = FLOW_LABEL.set(
            TRAFFIC_CLASS.set(
                VERSION.set(0, self.version as u32),
                self.traffic_class as u32,
            ),
            self.flow_label,
        );
        writer.write(word)?;
        writer.write(payload_length)?;
        writer.write(self.extension_headers.first().map_or(upper, |header| header.kind))?;
        writer.write(self.hop_limit)?;
        writer.write_bytes(&self.source.octets())?;
        writer.write_bytes(&self.destination.octets())?;

        let mut headers = self.extension_headers.iter().peekable();
        while let Some(header) = headers.next() {
            let next = headers.peek().map_or(upper, |following| following.kind);
            header.write(next, writer)?;
        }
        Ok(())
    }

    fn refresh(&mut self, header: &[u8]) {
        if header.len() < Self::HEADER_SIZE {
            return;
        }
        self.payload_length = u16::from_be_bytes([header[4], header[5]]);
        self.next_header = header[6];

        let mut offset = Self::HEADER_SIZE;
        for extension in &mut self.extension_headers {
            let size = extension.size();
            if let Some(written) = header.get(offset..offset + size) {
                extension.next_header = written[0];
                extension.data = written[2..].to_vec();
            }
            offset += size;
        }
    }

    fn from_layer(layer: &Layer) -> Option<&Self> {
        match layer {
            Layer::Ipv6(ip) => Some(ip),
            _ => None,
        }
    }

    fn from_layer_mut(layer: &mut Layer) -> Option<&mut Self> {
        match layer {
            Layer::Ipv6(ip) => Some(ip),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::RawPayload;
    use crate::registry::LayerRegistry;
    use crate::tcp::TcpSegment;
    use crate::udp::UdpDatagram;
    use pducraft_core::{DecodeConfig, EncodeConfig};

    fn hex(text: &str) -> Vec<u8> {
        (0..text.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&text[i..i + 2], 16).unwrap())
            .collect()
    }

    fn kinds(ip: &Ipv6Packet) -> Vec<u8> {
        ip.extension_headers()
            .iter()
            .map(ExtensionHeader::kind)
            .collect()
    }

    // IPv6 + TCP SYN with 20 bytes of options; the TCP checksum was left to
    // the NIC and reads 0x0030
    const TCP_CAPTURE: &str = "69a82734002806400000000000000000000000000000000100000000000000000000000000000001c68c00506848030c00000000a0027ff00030000002043ff80402080a0084a39c0000000001030307";

    // IPv6 hop-by-hop (router alert) carrying an ICMPv6 MLD report
    const HOP_BY_HOP_CAPTURE: &str = "6000000000240001fe8000000000000002d009fffee3e8deff0200000000000000000000000000163a000502000001008f0074fe0000000104000000ff0200000000000000000001ff9806e1";

    #[test]
    fn test_decode_tcp_capture() {
        let bytes = hex(TCP_CAPTURE);
        assert_eq!(bytes.len(), 80);

        let pdu = Pdu::decode(LayerKind::Ipv6, &bytes).unwrap();
        assert_eq!(pdu.layers(), vec![LayerKind::Ipv6, LayerKind::Tcp]);

        let ip = pdu.find::<Ipv6Packet>().unwrap();
        assert_eq!(ip.version, 6);
        assert_eq!(ip.traffic_class, 0x9a);
        assert_eq!(ip.flow_label, 0x82734);
        assert_eq!(ip.payload_length, 40);
        assert_eq!(ip.next_header, ip_protocols::TCP);
        assert_eq!(ip.upper_layer_protocol(), ip_protocols::TCP);
        assert_eq!(ip.hop_limit, 64);
        assert_eq!(ip.source, Ipv6Addr::LOCALHOST);
        assert_eq!(ip.destination, Ipv6Addr::LOCALHOST);
        assert!(ip.extension_headers().is_empty());

        let tcp = pdu.find::<TcpSegment>().unwrap();
        assert_eq!(tcp.source_port, 50828);
        assert_eq!(tcp.destination_port, 80);
        assert_eq!(tcp.data_offset, 10);
        assert_eq!(tcp.options.len(), 20);
        assert_eq!(tcp.checksum, 0x0030);
    }

    #[test]
    fn test_tcp_capture_checksums() {
        let bytes = hex(TCP_CAPTURE);
        let pdu = Pdu::decode(LayerKind::Ipv6, &bytes).unwrap();

        let preserved = pdu
            .serialize_with(&EncodeConfig::preserve_checksums())
            .unwrap();
        assert_eq!(preserved, bytes);

        let recomputed = pdu.serialize().unwrap();
        assert_eq!(recomputed.len(), 80);
        assert_eq!(&recomputed[56..58], &[0xb7, 0x78]);
        assert_eq!(&recomputed[..56], &bytes[..56]);
        assert_eq!(&recomputed[58..], &bytes[58..]);
    }

    #[test]
    fn test_decode_hop_by_hop_capture() {
        let bytes = hex(HOP_BY_HOP_CAPTURE);
        assert_eq!(bytes.len(), 76);

        let pdu = Pdu::decode(LayerKind::Ipv6, &bytes).unwrap();
        let ip = pdu.find::<Ipv6Packet>().unwrap();
        assert_eq!(ip.hop_limit, 1);
        assert_eq!(ip.payload_length, 36);
        assert_eq!(ip.next_header, ip_protocols::HOP_BY_HOP);
        assert_eq!(ip.upper_layer_protocol(), ip_protocols::ICMPV6);
        assert_eq!(ip.extension_headers().len(), 1);

        let hop_by_hop = ip.search_option(ip_protocols::HOP_BY_HOP).unwrap();
        assert_eq!(hop_by_hop.data(), &[0x05, 0x02, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(hop_by_hop.next_header(), ip_protocols::ICMPV6);
        assert_eq!(hop_by_hop.size(), 8);
        assert!(ip.search_option(ip_protocols::ROUTING).is_none());

        assert_eq!(pdu.find::<RawPayload>().unwrap().len(), 28);
        assert_eq!(pdu.serialize().unwrap(), bytes);
    }

    #[test]
    fn test_version_is_kept() {
        let mut bytes = hex(HOP_BY_HOP_CAPTURE);
        bytes[0] = 0x30;

        let pdu = Pdu::decode(LayerKind::Ipv6, &bytes).unwrap();
        assert_eq!(pdu.find::<Ipv6Packet>().unwrap().version, 3);
        assert_eq!(pdu.serialize().unwrap(), bytes);

        let ip = Ipv6Packet::new(Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST, 59).with_version(0x13);
        assert_eq!(ip.version, 3);
        let bytes = Pdu::new(ip).serialize().unwrap();
        assert_eq!(bytes[0] >> 4, 3);
    }

    #[test]
    fn test_add_extension_header_moves_upper_protocol() {
        let mut ip = Ipv6Packet::new(Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST, ip_protocols::TCP);
        ip.add_extension_header(ExtensionHeader::new(ip_protocols::HOP_BY_HOP, vec![]));
        assert_eq!(ip.next_header, ip_protocols::HOP_BY_HOP);
        assert_eq!(ip.upper_layer_protocol(), ip_protocols::TCP);

        ip.add_extension_header(ExtensionHeader::new(ip_protocols::ROUTING, vec![]));
        assert_eq!(ip.extension_headers()[0].next_header(), ip_protocols::ROUTING);
        assert_eq!(ip.extension_headers()[1].next_header(), ip_protocols::TCP);

        ip.set_upper_layer_protocol(ip_protocols::UDP);
        assert_eq!(ip.upper_layer_protocol(), ip_protocols::UDP);
        assert_eq!(ip.next_header, ip_protocols::HOP_BY_HOP);
    }

    #[test]
    fn test_extension_chain_written_in_order() {
        let mut ip = Ipv6Packet::new(
            Ipv6Addr::LOCALHOST,
            Ipv6Addr::LOCALHOST,
            ip_protocols::NO_NEXT_HEADER,
        );
        ip.add_extension_header(ExtensionHeader::new(ip_protocols::HOP_BY_HOP, vec![1, 4, 0, 0]));
        ip.add_extension_header(ExtensionHeader::new(
            ip_protocols::DESTINATION_OPTIONS,
            vec![1; 7],
        ));
        assert_eq!(ip.extensions_size(), 8 + 16);

        let pdu = Pdu::new(ip)
            .with_inner(Pdu::new(TcpSegment::new(1, 2, 0, 0, Default::default(), 0)));
        let bytes = pdu.serialize().unwrap();
        assert_eq!(bytes.len(), 40 + 24 + 20);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 44);
        assert_eq!(bytes[6], ip_protocols::HOP_BY_HOP);
        assert_eq!(&bytes[40..42], &[ip_protocols::DESTINATION_OPTIONS, 0]);
        assert_eq!(&bytes[48..50], &[ip_protocols::TCP, 1]);

        let decoded = Pdu::decode(LayerKind::Ipv6, &bytes).unwrap();
        let ip = decoded.find::<Ipv6Packet>().unwrap();
        assert_eq!(ip.next_header, ip_protocols::HOP_BY_HOP);
        assert_eq!(ip.upper_layer_protocol(), ip_protocols::TCP);
        assert_eq!(
            kinds(ip),
            vec![ip_protocols::HOP_BY_HOP, ip_protocols::DESTINATION_OPTIONS]
        );
        assert!(decoded.find::<TcpSegment>().is_some());
    }

    #[test]
    fn test_custom_protocol_binding_roundtrip() {
        const EXPERIMENTAL: u8 = 136;

        let mut registry = LayerRegistry::new();
        registry.register(
            Binding::IpProtocol(EXPERIMENTAL),
            <UdpDatagram as LayerCodec>::decode,
        );

        for with_extension in [false, true] {
            let mut ip = Ipv6Packet::new(Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST, EXPERIMENTAL);
            if with_extension {
                ip.add_extension_header(ExtensionHeader::new(
                    ip_protocols::DESTINATION_OPTIONS,
                    vec![],
                ));
            }
            let bytes = Pdu::new(ip)
                .with_inner(Pdu::new(UdpDatagram::new(1000, 2000)).with_inner(Pdu::raw(vec![7; 5])))
                .serialize()
                .unwrap();

            let pdu =
                Pdu::decode_with(LayerKind::Ipv6, &bytes, &registry, &DecodeConfig::default())
                    .unwrap();
            assert_eq!(
                pdu.layers(),
                vec![LayerKind::Ipv6, LayerKind::Udp, LayerKind::Raw]
            );
            let ip = pdu.find::<Ipv6Packet>().unwrap();
            assert_eq!(ip.upper_layer_protocol(), EXPERIMENTAL);
            assert_eq!(
                pdu.serialize_with(&EncodeConfig::preserve_checksums())
                    .unwrap(),
                bytes
            );
            assert_eq!(pdu.serialize().unwrap(), bytes);
        }
    }

    #[test]
    fn test_authentication_header_length() {
        let header = ExtensionHeader::new(ip_protocols::AUTHENTICATION, vec![0; 10]);
        assert_eq!(header.size(), 12);

        let mut ip = Ipv6Packet::new(Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST, 59);
        ip.add_extension_header(header);
        let bytes = Pdu::new(ip).serialize().unwrap();
        // 4 * (len + 2) == 12
        assert_eq!(bytes[41], 1);
        assert_eq!(bytes[40], 59);

        let decoded = Pdu::decode(LayerKind::Ipv6, &bytes).unwrap();
        assert_eq!(decoded.find::<Ipv6Packet>().unwrap().extensions_size(), 12);
    }

    #[test]
    fn test_padding_on_new() {
        let header = ExtensionHeader::new(ip_protocols::DESTINATION_OPTIONS, vec![1, 2, 3]);
        assert_eq!(header.size(), 8);
        assert_eq!(header.data(), &[1, 2, 3, 0, 0, 0]);

        let header = ExtensionHeader::new(ip_protocols::ROUTING, vec![1; 7]);
        assert_eq!(header.size(), 16);

        let header = ExtensionHeader::new(ip_protocols::FRAGMENT, vec![1; 10]);
        assert_eq!(header.size(), 8);
        assert_eq!(header.data().len(), 6);
    }

    #[test]
    fn test_fragment_payload_is_raw() {
        let mut ip = Ipv6Packet::new(
            Ipv6Addr::LOCALHOST,
            Ipv6Addr::LOCALHOST,
            ip_protocols::NO_NEXT_HEADER,
        );
        ip.add_extension_header(ExtensionHeader::fragment(0, true, 0xdeadbeef));
        let pdu = Pdu::new(ip)
            .with_inner(Pdu::new(TcpSegment::new(1, 2, 0, 0, Default::default(), 0)));
        let bytes = pdu.serialize().unwrap();
        assert_eq!(&bytes[40..42], &[ip_protocols::TCP, 0]);

        let decoded = Pdu::decode(LayerKind::Ipv6, &bytes).unwrap();
        let ip = decoded.find::<Ipv6Packet>().unwrap();
        let info = ip
            .search_option(ip_protocols::FRAGMENT)
            .and_then(ExtensionHeader::fragment_info)
            .unwrap();
        assert_eq!(info.offset, 0);
        assert!(info.more_fragments);
        assert_eq!(info.identification, 0xdeadbeef);
        assert!(ip.is_fragment());
        assert_eq!(decoded.layers(), vec![LayerKind::Ipv6, LayerKind::Raw]);
    }

    #[test]
    fn test_fragment_reserved_byte_ignored() {
        let mut ip = Ipv6Packet::new(Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST, 59);
        ip.add_extension_header(ExtensionHeader::fragment(0, false, 7));
        let mut bytes = Pdu::new(ip).with_inner(Pdu::raw(vec![1; 8])).serialize().unwrap();
        bytes[41] = 0xff;

        let pdu = Pdu::decode(LayerKind::Ipv6, &bytes).unwrap();
        let ip = pdu.find::<Ipv6Packet>().unwrap();
        assert_eq!(ip.extensions_size(), 8);
        assert_eq!(
            ip.extension_headers()[0].fragment_info().unwrap().identification,
            7
        );
        assert!(!ip.is_fragment());
        assert_eq!(pdu.find::<RawPayload>().unwrap().len(), 8);

        let written = pdu.serialize().unwrap();
        assert_eq!(written[41], 0);
        assert_eq!(&written[42..], &bytes[42..]);
    }

    #[test]
    fn test_extension_limit() {
        let mut ip = Ipv6Packet::new(Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST, 59);
        for _ in 0..3 {
            ip.add_extension_header(ExtensionHeader::new(
                ip_protocols::DESTINATION_OPTIONS,
                vec![],
            ));
        }
        let bytes = Pdu::new(ip).serialize().unwrap();

        let config = DecodeConfig::new().with_max_extension_headers(2);
        let err = Pdu::decode_with(LayerKind::Ipv6, &bytes, &LayerRegistry::new(), &config)
            .unwrap_err();
        assert_eq!(err, Error::ExtensionChainTooLong { limit: 2 });

        let config = DecodeConfig::new().with_max_extension_headers(3);
        assert!(Pdu::decode_with(LayerKind::Ipv6, &bytes, &LayerRegistry::new(), &config).is_ok());
    }

    #[test]
    fn test_payload_ends_inside_extension_chain() {
        let mut ip = Ipv6Packet::new(Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST, 59);
        ip.add_extension_header(ExtensionHeader::new(ip_protocols::HOP_BY_HOP, vec![]));
        ip.add_extension_header(ExtensionHeader::new(
            ip_protocols::DESTINATION_OPTIONS,
            vec![],
        ));
        let bytes = Pdu::new(ip).serialize().unwrap();
        assert_eq!(bytes.len(), 56);

        // Region ends between the two headers: the walk stops there
        let mut short = bytes[..48].to_vec();
        short[4..6].copy_from_slice(&8u16.to_be_bytes());
        let pdu = Pdu::decode(LayerKind::Ipv6, &short).unwrap();
        let ip = pdu.find::<Ipv6Packet>().unwrap();
        assert_eq!(kinds(ip), vec![ip_protocols::HOP_BY_HOP]);
        assert_eq!(ip.upper_layer_protocol(), ip_protocols::DESTINATION_OPTIONS);
        assert!(pdu.inner().is_none());
        assert_eq!(pdu.serialize().unwrap(), short);

        // Region ends inside the second header
        let mut short = bytes[..52].to_vec();
        short[4..6].copy_from_slice(&12u16.to_be_bytes());
        assert_eq!(
            Pdu::decode(LayerKind::Ipv6, &short).unwrap_err(),
            Error::truncated("IPv6", 8, 4)
        );
    }

    #[test]
    fn test_truncated_packets() {
        let bytes = hex(HOP_BY_HOP_CAPTURE);
        assert_eq!(
            Pdu::decode(LayerKind::Ipv6, &bytes[..39]).unwrap_err(),
            Error::truncated("IPv6", 40, 39)
        );
        assert_eq!(
            Pdu::decode(LayerKind::Ipv6, &bytes[..70]).unwrap_err(),
            Error::truncated("IPv6", 76, 70)
        );

        // Extension length pointing past the payload region
        let mut long_extension = bytes.clone();
        long_extension[41] = 8;
        assert_eq!(
            Pdu::decode(LayerKind::Ipv6, &long_extension).unwrap_err(),
            Error::truncated("IPv6", 72, 36)
        );
    }

    #[test]
    fn test_builder_fields_and_finalize() {
        let ip = Ipv6Packet::new(Ipv6Addr::LOCALHOST, Ipv6Addr::UNSPECIFIED, 59)
            .with_hop_limit(255)
            .with_traffic_class(0x2e)
            .with_flow_label(0xfff12345);
        assert_eq!(ip.flow_label, 0x12345);

        let mut pdu = Pdu::new(ip).with_inner(Pdu::raw(vec![0; 10]));
        pdu.finalize().unwrap();

        let ip = pdu.find::<Ipv6Packet>().unwrap();
        assert_eq!(ip.payload_length, 10);
        assert_eq!(ip.next_header, ip_protocols::NO_NEXT_HEADER);

        let bytes = pdu.serialize().unwrap();
        assert_eq!(bytes[0], 0x62);
        assert_eq!(bytes[1], 0xe1);
        assert_eq!(Pdu::decode(LayerKind::Ipv6, &bytes).unwrap(), pdu);
    }

    #[test]
    fn test_payload_length_overflow() {
        let pdu = Pdu::new(Ipv6Packet::new(Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST, 59))
            .with_inner(Pdu::raw(vec![0; 65536]));
        assert_eq!(
            pdu.serialize().unwrap_err(),
            Error::FieldOverflow {
                field: "payload_length",
                value: 65536
            }
        );
    }
}
