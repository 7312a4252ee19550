//! PDU chains
//!
//! A decoded packet is a singly linked chain of [`Pdu`] nodes, outermost
//! layer first. Each node owns one [`Layer`] and, optionally, the node for
//! the payload that layer encapsulates.
//!
//! Serialization runs top down: every layer learns the precomputed size of
//! everything it encapsulates before it writes its own header, and layers
//! with trailing work (Ethernet padding, transport checksums) finish after
//! their payload bytes exist.

use crate::checksum::PseudoHeader;
use crate::cursor::ByteWriter;
use crate::dns::DnsMessage;
use crate::ethernet::EthernetFrame;
use crate::ip::Ipv4Packet;
use crate::ipv6::Ipv6Packet;
use crate::raw::RawPayload;
use crate::registry::{DecodeFn, Decoder, LayerRegistry};
use crate::tcp::TcpSegment;
use crate::udp::UdpDatagram;
use bytes::Bytes;
use pducraft_core::{ethertypes, ip_protocols, DecodeConfig, EncodeConfig, Result};
use std::fmt;

/// Discriminant of a [`Layer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Ethernet,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Dns,
    Raw,
}

impl LayerKind {
    /// Human readable layer name, also used in error messages
    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Ethernet => "Ethernet",
            LayerKind::Ipv4 => "IPv4",
            LayerKind::Ipv6 => "IPv6",
            LayerKind::Tcp => "TCP",
            LayerKind::Udp => "UDP",
            LayerKind::Dns => "DNS",
            LayerKind::Raw => "Raw",
        }
    }

    /// Decoder used when this kind is the root of a chain
    pub fn decoder(self) -> DecodeFn {
        match self {
            LayerKind::Ethernet => <EthernetFrame as LayerCodec>::decode,
            LayerKind::Ipv4 => <Ipv4Packet as LayerCodec>::decode,
            LayerKind::Ipv6 => <Ipv6Packet as LayerCodec>::decode,
            LayerKind::Tcp => <TcpSegment as LayerCodec>::decode,
            LayerKind::Udp => <UdpDatagram as LayerCodec>::decode,
            LayerKind::Dns => <DnsMessage as LayerCodec>::decode,
            LayerKind::Raw => <RawPayload as LayerCodec>::decode,
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a layer needs to know about its surroundings while writing
#[derive(Debug, Clone, Copy)]
pub struct WriteContext<'a> {
    pub config: &'a EncodeConfig,
    /// Serialized size of the encapsulated chain
    pub payload_len: usize,
    /// The directly encapsulated layer, if any
    pub inner: Option<&'a Layer>,
    /// Addresses of the nearest enclosing IP layer
    pub pseudo: Option<PseudoHeader>,
}

impl WriteContext<'_> {
    /// Kind of the directly encapsulated layer
    pub fn inner_kind(&self) -> Option<LayerKind> {
        self.inner.map(Layer::kind)
    }

    /// Protocol number to write for the payload. `stored` is kept unless it
    /// is [`ip_protocols::NO_NEXT_HEADER`], in which case a payload layer
    /// with a protocol number of its own supplies it.
    pub fn ip_protocol_or(&self, stored: u8) -> u8 {
        if stored != ip_protocols::NO_NEXT_HEADER {
            return stored;
        }
        self.inner.and_then(Layer::ip_protocol).unwrap_or(stored)
    }

    /// EtherType to write for the payload, taken from the payload layer
    /// only when `stored` is zero
    pub fn ethertype_or(&self, stored: u16) -> u16 {
        if stored != 0 {
            return stored;
        }
        self.inner.and_then(Layer::ethertype).unwrap_or(stored)
    }

    /// Pseudo-header to checksum against, when checksums are being
    /// recomputed and an IP layer encloses this one
    pub fn checksum_pseudo(&self) -> Option<PseudoHeader> {
        if self.config.recompute_checksums {
            self.pseudo
        } else {
            None
        }
    }
}

/// Wire codec of a single layer.
///
/// `decode` consumes the layer's own header from the front of `bytes` and
/// hands the rest to the [`Decoder`] for its payload. The write half only
/// ever emits this layer's header and trailer; the chain writes the payload
/// in between.
pub trait LayerCodec: Sized + Into<Layer> {
    const KIND: LayerKind;

    /// Decode this layer and everything it encapsulates
    fn decode(bytes: &[u8], decoder: &mut Decoder<'_>) -> Result<Pdu>;

    /// Bytes written before the payload
    fn header_size(&self) -> usize;

    /// Bytes written after the payload
    fn trailer_size(&self) -> usize {
        0
    }

    fn write_header(&self, writer: &mut ByteWriter, ctx: &WriteContext<'_>) -> Result<()>;

    /// Called once the payload has been written. `start` is the offset of
    /// this layer's first header byte.
    fn write_trailer(
        &self,
        _writer: &mut ByteWriter,
        _start: usize,
        _ctx: &WriteContext<'_>,
    ) -> Result<()> {
        Ok(())
    }

    /// Re-read fields the writer derives (lengths, checksums, protocol
    /// numbers) from this layer's freshly written header
    fn refresh(&mut self, _header: &[u8]) {}

    fn from_layer(layer: &Layer) -> Option<&Self>;

    fn from_layer_mut(layer: &mut Layer) -> Option<&mut Self>;
}

/// One protocol layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Ethernet(EthernetFrame),
    Ipv4(Ipv4Packet),
    Ipv6(Ipv6Packet),
    Tcp(TcpSegment),
    Udp(UdpDatagram),
    Dns(DnsMessage),
    Raw(RawPayload),
}

macro_rules! each_layer {
    ($layer:expr, $l:ident => $body:expr) => {
        match $layer {
            Layer::Ethernet($l) => $body,
            Layer::Ipv4($l) => $body,
            Layer::Ipv6($l) => $body,
            Layer::Tcp($l) => $body,
            Layer::Udp($l) => $body,
            Layer::Dns($l) => $body,
            Layer::Raw($l) => $body,
        }
    };
}

macro_rules! impl_from_layer {
    ($($variant:ident($ty:ty);)*) => {
        $(
            impl From<$ty> for Layer {
                fn from(layer: $ty) -> Self {
                    Layer::$variant(layer)
                }
            }
        )*
    };
}

impl_from_layer! {
    Ethernet(EthernetFrame);
    Ipv4(Ipv4Packet);
    Ipv6(Ipv6Packet);
    Tcp(TcpSegment);
    Udp(UdpDatagram);
    Dns(DnsMessage);
    Raw(RawPayload);
}

impl Layer {
    /// Kind of this layer
    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Ethernet(_) => LayerKind::Ethernet,
            Layer::Ipv4(_) => LayerKind::Ipv4,
            Layer::Ipv6(_) => LayerKind::Ipv6,
            Layer::Tcp(_) => LayerKind::Tcp,
            Layer::Udp(_) => LayerKind::Udp,
            Layer::Dns(_) => LayerKind::Dns,
            Layer::Raw(_) => LayerKind::Raw,
        }
    }

    /// Bytes written before the payload
    pub fn header_size(&self) -> usize {
        each_layer!(self, l => l.header_size())
    }

    /// Bytes written after the payload
    pub fn trailer_size(&self) -> usize {
        each_layer!(self, l => l.trailer_size())
    }

    fn write_header(&self, writer: &mut ByteWriter, ctx: &WriteContext<'_>) -> Result<()> {
        each_layer!(self, l => l.write_header(writer, ctx))
    }

    fn write_trailer(
        &self,
        writer: &mut ByteWriter,
        start: usize,
        ctx: &WriteContext<'_>,
    ) -> Result<()> {
        each_layer!(self, l => l.write_trailer(writer, start, ctx))
    }

    fn refresh(&mut self, header: &[u8]) {
        each_layer!(self, l => l.refresh(header))
    }

    /// Protocol number this layer is carried under inside IPv4/IPv6
    pub fn ip_protocol(&self) -> Option<u8> {
        match self {
            Layer::Ipv4(_) => Some(ip_protocols::IPV4),
            Layer::Ipv6(_) => Some(ip_protocols::IPV6),
            Layer::Tcp(_) => Some(ip_protocols::TCP),
            Layer::Udp(_) => Some(ip_protocols::UDP),
            _ => None,
        }
    }

    /// EtherType this layer is carried under inside Ethernet
    pub fn ethertype(&self) -> Option<u16> {
        match self {
            Layer::Ipv4(_) => Some(ethertypes::IPV4),
            Layer::Ipv6(_) => Some(ethertypes::IPV6),
            _ => None,
        }
    }

    /// Transport pseudo-header addresses, for IP layers
    pub fn pseudo_header(&self) -> Option<PseudoHeader> {
        match self {
            Layer::Ipv4(ip) => Some(PseudoHeader::V4 {
                source: ip.source,
                destination: ip.destination,
            }),
            Layer::Ipv6(ip) => Some(PseudoHeader::V6 {
                source: ip.source,
                destination: ip.destination,
            }),
            _ => None,
        }
    }
}

/// A node in a PDU chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    layer: Layer,
    inner: Option<Box<Pdu>>,
}

impl Pdu {
    /// A node without payload
    pub fn new<L: Into<Layer>>(layer: L) -> Self {
        Pdu {
            layer: layer.into(),
            inner: None,
        }
    }

    /// A raw payload leaf
    pub fn raw<B: Into<Bytes>>(data: B) -> Self {
        Pdu::new(RawPayload::new(data))
    }

    /// Builder-style [`set_inner`](Self::set_inner)
    pub fn with_inner(mut self, inner: Pdu) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Decode `bytes` as a chain rooted at `root`, with the default
    /// registry and limits
    pub fn decode(root: LayerKind, bytes: &[u8]) -> Result<Pdu> {
        Self::decode_with(root, bytes, &LayerRegistry::new(), &DecodeConfig::default())
    }

    /// Decode `bytes` as a chain rooted at `root`, with a caller-supplied registry and limits
    pub fn decode_with(
        root: LayerKind,
        bytes: &[u8],
        registry: &LayerRegistry,
        config: &DecodeConfig,
    ) -> Result<Pdu> {
        Decoder::new(registry, config).decode(root, bytes)
    }

    /// Kind of this layer
    pub fn kind(&self) -> LayerKind {
        self.layer.kind()
    }

    /// This node's layer
    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    /// This node's layer, mutably
    pub fn layer_mut(&mut self) -> &mut Layer {
        &mut self.layer
    }

    /// Take the layer, dropping the payload
    pub fn into_layer(self) -> Layer {
        self.layer
    }

    /// The encapsulated node, if any
    pub fn inner(&self) -> Option<&Pdu> {
        self.inner.as_deref()
    }

    /// The encapsulated node, mutably
    pub fn inner_mut(&mut self) -> Option<&mut Pdu> {
        self.inner.as_deref_mut()
    }

    /// Replace the payload, dropping the previous one
    pub fn set_inner(&mut self, inner: Option<Pdu>) {
        self.inner = inner.map(Box::new);
    }

    /// Detach and return the payload
    pub fn take_inner(&mut self) -> Option<Pdu> {
        self.inner.take().map(|inner| *inner)
    }

    /// The last node of the chain
    pub fn innermost_mut(&mut self) -> &mut Pdu {
        match self.inner {
            Some(ref mut inner) => inner.innermost_mut(),
            None => self,
        }
    }

    /// Append `pdu` below the innermost node
    pub fn push(&mut self, pdu: Pdu) {
        self.innermost_mut().inner = Some(Box::new(pdu));
    }

    /// Layers, outermost first
    pub fn iter(&self) -> Layers<'_> {
        Layers { next: Some(self) }
    }

    /// Kinds of all layers, outermost first
    pub fn layers(&self) -> Vec<LayerKind> {
        self.iter().map(Layer::kind).collect()
    }

    /// First layer of type `K`, searching outermost first
    pub fn find<K: LayerCodec>(&self) -> Option<&K> {
        self.iter().find_map(K::from_layer)
    }

    /// Mutable [`find`](Self::find)
    pub fn find_mut<K: LayerCodec>(&mut self) -> Option<&mut K> {
        let mut node = Some(self);
        while let Some(pdu) = node {
            if K::from_layer(&pdu.layer).is_some() {
                return K::from_layer_mut(&mut pdu.layer);
            }
            node = pdu.inner.as_deref_mut();
        }
        None
    }

    /// Serialized size of this node and everything under it
    pub fn size(&self) -> usize {
        let inner = self.inner.as_ref().map_or(0, |inner| inner.size());
        self.layer.header_size() + inner + self.layer.trailer_size()
    }

    /// Encode the chain, recomputing lengths and checksums
    pub fn serialize(&self) -> Result<Vec<u8>> {
        self.serialize_with(&EncodeConfig::default())
    }

    /// Encode the chain with an explicit checksum policy
    pub fn serialize_with(&self, config: &EncodeConfig) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::with_limit(self.size());
        self.write_into(&mut writer, config, None)?;
        Ok(writer.into_vec())
    }

    fn write_into(
        &self,
        writer: &mut ByteWriter,
        config: &EncodeConfig,
        pseudo: Option<PseudoHeader>,
    ) -> Result<()> {
        let start = writer.len();
        let ctx = WriteContext {
            config,
            payload_len: self.inner.as_ref().map_or(0, |inner| inner.size()),
            inner: self.inner.as_deref().map(|inner| &inner.layer),
            pseudo,
        };

        self.layer.write_header(writer, &ctx)?;
        if let Some(inner) = &self.inner {
            let pseudo = self.layer.pseudo_header().or(pseudo);
            inner.write_into(writer, config, pseudo)?;
        }
        self.layer.write_trailer(writer, start, &ctx)
    }

    /// Store the values the writer derives (lengths, protocol numbers,
    /// checksums) back into every layer, so the chain compares equal to
    /// what decoding its own serialization yields
    pub fn finalize(&mut self) -> Result<()> {
        let bytes = self.serialize()?;
        let mut offset = 0;
        let mut node = Some(self);
        while let Some(pdu) = node {
            let header_len = pdu.layer.header_size();
            if let Some(header) = bytes.get(offset..offset + header_len) {
                pdu.layer.refresh(header);
            }
            offset += header_len;
            node = pdu.inner.as_deref_mut();
        }
        Ok(())
    }
}

impl fmt::Display for Pdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, layer) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" / ")?;
            }
            write!(f, "{}", layer.kind())?;
        }
        Ok(())
    }
}

/// Iterator over the layers of a chain, see [`Pdu::iter`]
#[derive(Debug, Clone)]
pub struct Layers<'a> {
    next: Option<&'a Pdu>,
}

impl<'a> Iterator for Layers<'a> {
    type Item = &'a Layer;

    fn next(&mut self) -> Option<Self::Item> {
        let pdu = self.next?;
        self.next = pdu.inner.as_deref();
        Some(&pdu.layer)
    }
}

impl<'a> IntoIterator for &'a Pdu {
    type Item = &'a Layer;
    type IntoIter = Layers<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
