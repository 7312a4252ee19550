//! Payload dispatch
//!
//! Every layer names its payload through a [`Binding`] (an EtherType, an IP
//! protocol number or a UDP port). The [`LayerRegistry`] maps bindings to
//! decoders; a payload whose binding has no decoder is kept as a raw leaf,
//! which is how unsupported protocols pass through a decode untouched.

use crate::dns::DnsMessage;
use crate::ethernet::EthernetFrame;
use crate::ip::Ipv4Packet;
use crate::ipv6::Ipv6Packet;
use crate::pdu::{LayerCodec, LayerKind, Pdu};
use crate::tcp::TcpSegment;
use crate::udp::UdpDatagram;
use pducraft_core::{ethertypes, ip_protocols, DecodeConfig, Result};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};

/// The value a layer uses to announce its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    EtherType(u16),
    IpProtocol(u8),
    UdpPort(u16),
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::EtherType(value) => write!(f, "ethertype 0x{:04x}", value),
            Binding::IpProtocol(value) => write!(f, "ip protocol {}", value),
            Binding::UdpPort(value) => write!(f, "udp port {}", value),
        }
    }
}

/// Decodes one layer (and, through the [`Decoder`], its payload)
pub type DecodeFn = fn(&[u8], &mut Decoder<'_>) -> Result<Pdu>;

/// Binding to decoder table
#[derive(Debug, Clone)]
pub struct LayerRegistry {
    decoders: HashMap<Binding, DecodeFn>,
}

impl LayerRegistry {
    /// Registry with the built-in Ethernet and IP bindings.
    ///
    /// DNS is left unbound: its record codec is strict enough to reject
    /// everyday responses, so it is opted into per port with
    /// [`with_dns_port`](Self::with_dns_port).
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(
            Binding::EtherType(ethertypes::IPV4),
            <Ipv4Packet as LayerCodec>::decode,
        );
        registry.register(
            Binding::EtherType(ethertypes::IPV6),
            <Ipv6Packet as LayerCodec>::decode,
        );
        registry.register(
            Binding::IpProtocol(ip_protocols::IPV4),
            <Ipv4Packet as LayerCodec>::decode,
        );
        registry.register(
            Binding::IpProtocol(ip_protocols::TCP),
            <TcpSegment as LayerCodec>::decode,
        );
        registry.register(
            Binding::IpProtocol(ip_protocols::UDP),
            <UdpDatagram as LayerCodec>::decode,
        );
        registry.register(
            Binding::IpProtocol(ip_protocols::IPV6),
            <Ipv6Packet as LayerCodec>::decode,
        );
        registry
    }

    /// Registry without any binding; every payload decodes as raw bytes
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Bind `binding` to `decoder`, returning the decoder it replaces
    pub fn register(&mut self, binding: Binding, decoder: DecodeFn) -> Option<DecodeFn> {
        debug!(%binding, "Registering decoder");
        self.decoders.insert(binding, decoder)
    }

    /// Remove the decoder bound to `binding`, returning it
    pub fn unregister(&mut self, binding: Binding) -> Option<DecodeFn> {
        debug!(%binding, "Unregistering decoder");
        self.decoders.remove(&binding)
    }

    /// Decoder bound to `binding`
    pub fn lookup(&self, binding: Binding) -> Option<DecodeFn> {
        self.decoders.get(&binding).copied()
    }

    /// Whether `binding` has a decoder
    pub fn contains(&self, binding: Binding) -> bool {
        self.decoders.contains_key(&binding)
    }

    /// Decode UDP traffic to or from `port` as DNS messages
    pub fn with_dns_port(mut self, port: u16) -> Self {
        self.register(Binding::UdpPort(port), <DnsMessage as LayerCodec>::decode);
        self
    }

    /// Make Ethernet frames decodable under `binding`, e.g. for
    /// encapsulations carrying whole frames
    pub fn with_ethernet(mut self, binding: Binding) -> Self {
        self.register(binding, <EthernetFrame as LayerCodec>::decode);
        self
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether no binding is registered
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// All bound values, in no particular order
    pub fn bindings(&self) -> impl Iterator<Item = Binding> + '_ {
        self.decoders.keys().copied()
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// State threaded through one decode: the registry, the limits, and how
/// deep into the chain the decode currently is
#[derive(Debug)]
pub struct Decoder<'a> {
    registry: &'a LayerRegistry,
    config: &'a DecodeConfig,
    depth: usize,
}

impl<'a> Decoder<'a> {
    /// Decoder at depth zero
    pub fn new(registry: &'a LayerRegistry, config: &'a DecodeConfig) -> Self {
        Self {
            registry,
            config,
            depth: 0,
        }
    }

    /// Registry payloads are dispatched through
    pub fn registry(&self) -> &'a LayerRegistry {
        self.registry
    }

    /// Limits of this decode
    pub fn config(&self) -> &'a DecodeConfig {
        self.config
    }

    /// Number of layers currently being decoded, the root included
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Decode `bytes` as a chain rooted at a `root` layer
    pub fn decode(&mut self, root: LayerKind, bytes: &[u8]) -> Result<Pdu> {
        trace!(%root, len = bytes.len(), "Decoding chain");
        self.enter(root.decoder(), bytes)
    }

    fn enter(&mut self, decode: DecodeFn, bytes: &[u8]) -> Result<Pdu> {
        self.depth += 1;
        let result = decode(bytes, self);
        self.depth -= 1;
        result
    }

    /// Decode a payload announced under `binding`.
    ///
    /// Returns `None` for an empty payload. Unbound payloads, and payloads
    /// past the depth limit, become a raw leaf.
    pub fn decode_payload(&mut self, binding: Binding, bytes: &[u8]) -> Result<Option<Box<Pdu>>> {
        self.decode_payload_any(&[binding], bytes)
    }

    /// Like [`decode_payload`](Self::decode_payload), trying each binding
    /// in order and using the first one with a decoder
    pub fn decode_payload_any(
        &mut self,
        bindings: &[Binding],
        bytes: &[u8],
    ) -> Result<Option<Box<Pdu>>> {
        if bytes.is_empty() {
            return Ok(None);
        }

        if self.depth >= self.config.max_depth {
            debug!(
                depth = self.depth,
                len = bytes.len(),
                "Depth limit reached, keeping payload raw"
            );
            return Ok(self.raw(bytes));
        }

        let found = bindings
            .iter()
            .find_map(|&binding| self.registry.lookup(binding).map(|decode| (binding, decode)));

        match found {
            Some((binding, decode)) => {
                trace!(%binding, len = bytes.len(), "Dispatching payload");
                self.enter(decode, bytes).map(|pdu| Some(Box::new(pdu)))
            }
            None => {
                debug!(?bindings, len = bytes.len(), "No decoder bound, keeping payload raw");
                Ok(self.raw(bytes))
            }
        }
    }

    /// `bytes` as a raw leaf, or `None` if empty
    pub fn raw(&self, bytes: &[u8]) -> Option<Box<Pdu>> {
        if bytes.is_empty() {
            None
        } else {
            Some(Box::new(Pdu::raw(bytes.to_vec())))
        }
    }
}
