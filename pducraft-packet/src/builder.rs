//! Packet builder for constructing PDU chains with a fluent API
//!
//! The builder collects one optional layer per level and assembles them
//! inside out into a [`Pdu`] whose derived fields (lengths, protocol
//! numbers, checksums) are already filled in.

use crate::dns::DnsMessage;
use crate::ethernet::{EtherType, EthernetFrame};
use crate::ip::Ipv4Packet;
use crate::ipv6::Ipv6Packet;
use crate::pdu::Pdu;
use crate::tcp::{TcpFlags, TcpSegment};
use crate::udp::UdpDatagram;
use bytes::Bytes;
use pducraft_core::{ip_protocols, Error, MacAddr, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// Layer 2 frame type
#[derive(Debug, Clone)]
enum Layer2 {
    Ethernet {
        src: MacAddr,
        dst: MacAddr,
        ethertype: Option<EtherType>,
    },
}

/// Layer 3 packet type
#[derive(Debug, Clone)]
enum Layer3 {
    Ipv4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        ttl: u8,
        identification: u16,
    },
    Ipv6 {
        src: Ipv6Addr,
        dst: Ipv6Addr,
        hop_limit: u8,
    },
}

/// Layer 4 segment/datagram type
#[derive(Debug, Clone, Copy)]
enum Layer4 {
    Udp {
        src_port: u16,
        dst_port: u16,
    },
    Tcp {
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        window: u16,
    },
}

/// Packet builder with fluent API for constructing PDU chains
///
/// # Examples
///
/// ```
/// use pducraft_packet::dns::{DnsMessage, RecordName};
/// use pducraft_packet::{LayerKind, PacketBuilder};
/// use pducraft_core::MacAddr;
/// use std::net::Ipv4Addr;
///
/// let query = DnsMessage::query(
///     0x1234,
///     RecordName::from_domain("example.com").unwrap(),
///     1,
///     1,
/// );
///
/// let pdu = PacketBuilder::new()
///     .ethernet(MacAddr::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]), MacAddr::BROADCAST)
///     .ipv4(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 53))
///     .udp(40000, 53)
///     .dns(query)
///     .build()
///     .unwrap();
///
/// assert_eq!(
///     pdu.layers(),
///     vec![LayerKind::Ethernet, LayerKind::Ipv4, LayerKind::Udp, LayerKind::Dns]
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct PacketBuilder {
    layer2: Option<Layer2>,
    layer3: Option<Layer3>,
    layer4: Option<Layer4>,
    dns: Option<DnsMessage>,
    payload: Bytes,
    pad_to_minimum: bool,
}

impl PacketBuilder {
    /// Create a new packet builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an Ethernet layer. Its type is taken from the network layer
    /// unless set with [`ethertype`](Self::ethertype).
    pub fn ethernet(mut self, src: MacAddr, dst: MacAddr) -> Self {
        self.layer2 = Some(Layer2::Ethernet {
            src,
            dst,
            ethertype: None,
        });
        self
    }

    /// Set the EtherType written instead of the network layer's
    ///
    /// Must be called after `ethernet()`.
    pub fn ethertype(mut self, value: EtherType) -> Self {
        if let Some(Layer2::Ethernet {
            ref mut ethertype, ..
        }) = self.layer2
        {
            *ethertype = Some(value);
        }
        self
    }

    /// Add an IPv4 layer
    pub fn ipv4(mut self, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        self.layer3 = Some(Layer3::Ipv4 {
            src,
            dst,
            ttl: 64,
            identification: 0,
        });
        self
    }

    /// Add an IPv6 layer
    pub fn ipv6(mut self, src: Ipv6Addr, dst: Ipv6Addr) -> Self {
        self.layer3 = Some(Layer3::Ipv6 {
            src,
            dst,
            hop_limit: 64,
        });
        self
    }

    /// Set the IPv4 TTL or the IPv6 hop limit
    ///
    /// Must be called after `ipv4()` or `ipv6()`.
    pub fn ttl(mut self, new_ttl: u8) -> Self {
        match self.layer3 {
            Some(Layer3::Ipv4 { ref mut ttl, .. }) => *ttl = new_ttl,
            Some(Layer3::Ipv6 {
                ref mut hop_limit, ..
            }) => *hop_limit = new_ttl,
            None => {}
        }
        self
    }

    /// Set the identification for the IPv4 layer
    ///
    /// Must be called after `ipv4()`.
    pub fn identification(mut self, id: u16) -> Self {
        if let Some(Layer3::Ipv4 {
            ref mut identification,
            ..
        }) = self.layer3
        {
            *identification = id;
        }
        self
    }

    /// Add a UDP layer
    pub fn udp(mut self, src_port: u16, dst_port: u16) -> Self {
        self.layer4 = Some(Layer4::Udp { src_port, dst_port });
        self
    }

    /// Add a TCP layer
    pub fn tcp(
        mut self,
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
    ) -> Self {
        self.layer4 = Some(Layer4::Tcp {
            src_port,
            dst_port,
            seq,
            ack,
            flags,
            window: 65535,
        });
        self
    }

    /// Set the TCP window size
    ///
    /// Must be called after `tcp()`.
    pub fn window(mut self, new_window: u16) -> Self {
        if let Some(Layer4::Tcp { ref mut window, .. }) = self.layer4 {
            *window = new_window;
        }
        self
    }

    /// Carry a DNS message over the UDP layer
    pub fn dns(mut self, message: DnsMessage) -> Self {
        self.dns = Some(message);
        self
    }

    /// Set the raw payload data
    pub fn payload<B: Into<Bytes>>(mut self, data: B) -> Self {
        self.payload = data.into();
        self
    }

    /// Pad Ethernet frames up to the 60-byte minimum
    pub fn pad_to_minimum(mut self, pad: bool) -> Self {
        self.pad_to_minimum = pad;
        self
    }

    /// Build the PDU chain
    ///
    /// # Errors
    ///
    /// Returns [`Error::PacketConstruction`] if the layer configuration is
    /// invalid (a transport layer without a network layer, DNS anywhere but
    /// over UDP, DNS together with a raw payload, or nothing at all), or any
    /// encode error raised while deriving lengths and checksums.
    pub fn build(self) -> Result<Pdu> {
        if self.layer4.is_some() && self.layer3.is_none() {
            return Err(Error::construction("Layer 4 requires Layer 3"));
        }
        if self.dns.is_some() {
            if !self.payload.is_empty() {
                return Err(Error::construction(
                    "DNS message and raw payload are exclusive",
                ));
            }
            match self.layer4 {
                Some(Layer4::Udp { .. }) => {}
                Some(Layer4::Tcp { .. }) => {
                    return Err(Error::construction("DNS over TCP is not supported"));
                }
                None => return Err(Error::construction("DNS requires a UDP layer")),
            }
        }

        // Start with the payload
        let mut chain = match self.dns {
            Some(message) => Some(Pdu::new(message)),
            None if !self.payload.is_empty() => Some(Pdu::raw(self.payload)),
            None => None,
        };

        if let Some(layer4) = self.layer4 {
            let transport = match layer4 {
                Layer4::Udp { src_port, dst_port } => Pdu::new(UdpDatagram::new(src_port, dst_port)),
                Layer4::Tcp {
                    src_port,
                    dst_port,
                    seq,
                    ack,
                    flags,
                    window,
                } => Pdu::new(TcpSegment::new(src_port, dst_port, seq, ack, flags, window)),
            };
            chain = Some(wrap(transport, chain));
        }

        if let Some(layer3) = self.layer3 {
            let network = match layer3 {
                Layer3::Ipv4 {
                    src,
                    dst,
                    ttl,
                    identification,
                } => Pdu::new(
                    Ipv4Packet::new(src, dst, ip_protocols::NO_NEXT_HEADER)
                        .with_ttl(ttl)
                        .with_identification(identification),
                ),
                Layer3::Ipv6 { src, dst, hop_limit } => Pdu::new(
                    Ipv6Packet::new(src, dst, ip_protocols::NO_NEXT_HEADER)
                        .with_hop_limit(hop_limit),
                ),
            };
            chain = Some(wrap(network, chain));
        }

        if let Some(Layer2::Ethernet {
            src,
            dst,
            ethertype,
        }) = self.layer2
        {
            let mut frame = EthernetFrame::new(dst, src);
            if let Some(ethertype) = ethertype {
                frame = frame.with_ethertype(ethertype);
            }
            let payload_len = chain.as_ref().map_or(0, Pdu::size);
            if self.pad_to_minimum {
                frame.pad_to_minimum(payload_len);
            }
            chain = Some(wrap(Pdu::new(frame), chain));
        }

        let mut pdu = chain.ok_or_else(|| Error::construction("No layers configured"))?;
        pdu.finalize()?;
        debug!(layers = %pdu, size = pdu.size(), "Built packet");
        Ok(pdu)
    }

    /// Build the chain and serialize it
    pub fn build_bytes(self) -> Result<Vec<u8>> {
        self.build()?.serialize()
    }
}

fn wrap(mut outer: Pdu, inner: Option<Pdu>) -> Pdu {
    outer.set_inner(inner);
    outer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{transport_checksum, validate_checksum};
    use crate::dns::{DnsResourceRecord, RecordName};
    use crate::pdu::LayerKind;
    use crate::raw::RawPayload;
    use crate::registry::LayerRegistry;
    use pducraft_core::{dns_types, ethertypes, ip_protocols, DecodeConfig};

    const SRC_MAC: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const DST_MAC: MacAddr = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    const SRC_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
    const DST_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

    fn dns_answer() -> DnsMessage {
        let mut message = DnsMessage::query(
            0xbeef,
            RecordName::from_domain("example.com").unwrap(),
            dns_types::A,
            dns_types::CLASS_IN,
        );
        message.set_response(true);
        message.add_answer(DnsResourceRecord::a(
            "\x07example\x03com",
            300,
            Ipv4Addr::new(93, 184, 216, 34),
        ));
        message
    }

    #[test]
    fn test_builder_ethernet_only() {
        let pdu = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC)
            .ethertype(EtherType::Custom(0x88B5))
            .payload(vec![0x01, 0x02, 0x03, 0x04])
            .build()
            .unwrap();

        let frame = pdu.find::<EthernetFrame>().unwrap();
        assert_eq!(frame.source, SRC_MAC);
        assert_eq!(frame.destination, DST_MAC);
        assert_eq!(frame.ethertype, EtherType::Custom(0x88B5));
        assert_eq!(pdu.layers(), vec![LayerKind::Ethernet, LayerKind::Raw]);
    }

    #[test]
    fn test_builder_ethernet_ip_udp_dns() {
        let bytes = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC)
            .ipv4(SRC_IP, DST_IP)
            .udp(53, 40000)
            .dns(dns_answer())
            .build_bytes()
            .unwrap();

        assert_eq!(u16::from_be_bytes([bytes[12], bytes[13]]), ethertypes::IPV4);
        assert!(validate_checksum(&bytes[14..34]));
        assert_eq!(bytes[23], ip_protocols::UDP);

        let mut datagram = bytes[34..].to_vec();
        let stored = u16::from_be_bytes([datagram[6], datagram[7]]);
        datagram[6] = 0;
        datagram[7] = 0;
        assert_eq!(
            stored,
            transport_checksum(&SRC_IP.octets(), &DST_IP.octets(), 17, &datagram)
        );
    }

    #[test]
    fn test_built_chain_equals_decoded() {
        let pdu = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC)
            .ipv4(SRC_IP, DST_IP)
            .udp(53, 40000)
            .dns(dns_answer())
            .build()
            .unwrap();

        let registry = LayerRegistry::new().with_dns_port(53);
        let bytes = pdu.serialize().unwrap();
        let decoded =
            Pdu::decode_with(LayerKind::Ethernet, &bytes, &registry, &DecodeConfig::default())
                .unwrap();
        assert_eq!(decoded, pdu);

        let answer = decoded
            .find::<DnsMessage>()
            .and_then(|message| message.find_answer("\x07example\x03com"))
            .unwrap();
        assert_eq!(answer.data, vec![93, 184, 216, 34]);
    }

    #[test]
    fn test_builder_ethernet_ip_tcp() {
        let pdu = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC)
            .ipv4(SRC_IP, DST_IP)
            .tcp(12345, 80, 1000, 2000, TcpFlags::SYN)
            .window(1024)
            .payload(vec![0x01, 0x02, 0x03, 0x04])
            .build()
            .unwrap();

        let ip = pdu.find::<Ipv4Packet>().unwrap();
        assert_eq!(ip.source, SRC_IP);
        assert_eq!(ip.destination, DST_IP);
        assert_eq!(ip.protocol, ip_protocols::TCP);

        let tcp = pdu.find::<TcpSegment>().unwrap();
        assert_eq!(tcp.source_port, 12345);
        assert_eq!(tcp.destination_port, 80);
        assert_eq!(tcp.sequence_number, 1000);
        assert_eq!(tcp.acknowledgment_number, 2000);
        assert_eq!(tcp.window_size, 1024);
        assert!(tcp.flags.syn);

        let bytes = pdu.serialize().unwrap();
        assert_eq!(Pdu::decode(LayerKind::Ethernet, &bytes).unwrap(), pdu);
    }

    #[test]
    fn test_builder_ipv6_udp() {
        let pdu = PacketBuilder::new()
            .ipv6(Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST)
            .ttl(5)
            .udp(1000, 2000)
            .payload(&b"ping"[..])
            .build()
            .unwrap();

        let ip = pdu.find::<Ipv6Packet>().unwrap();
        assert_eq!(ip.hop_limit, 5);
        assert_eq!(ip.next_header, ip_protocols::UDP);
        assert_eq!(ip.payload_length, 12);
        assert_eq!(pdu.layers(), vec![LayerKind::Ipv6, LayerKind::Udp, LayerKind::Raw]);

        let bytes = pdu.serialize().unwrap();
        assert_eq!(Pdu::decode(LayerKind::Ipv6, &bytes).unwrap(), pdu);
    }

    #[test]
    fn test_builder_ttl_and_identification() {
        let pdu = PacketBuilder::new()
            .ipv4(SRC_IP, DST_IP)
            .ttl(128)
            .identification(0x1234)
            .build()
            .unwrap();

        let ip = pdu.find::<Ipv4Packet>().unwrap();
        assert_eq!(ip.ttl, 128);
        assert_eq!(ip.identification, 0x1234);
        assert_eq!(ip.total_length, 20);
    }

    #[test]
    fn test_builder_padding() {
        let pdu = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC)
            .ipv4(SRC_IP, DST_IP)
            .udp(1, 2)
            .payload(vec![0xAA])
            .pad_to_minimum(true)
            .build()
            .unwrap();

        let bytes = pdu.serialize().unwrap();
        assert_eq!(bytes.len(), EthernetFrame::MIN_FRAME_SIZE);

        let decoded = Pdu::decode(LayerKind::Ethernet, &bytes).unwrap();
        assert_eq!(decoded.find::<RawPayload>().unwrap().as_bytes(), &[0xAA]);
        assert_eq!(decoded.find::<EthernetFrame>().unwrap().trailer.len(), 60 - 43);
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn test_builder_invalid_combinations() {
        let err = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC)
            .udp(12345, 53)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::PacketConstruction(_)));

        let err = PacketBuilder::new()
            .ipv4(SRC_IP, DST_IP)
            .tcp(1, 53, 0, 0, TcpFlags::ACK)
            .dns(DnsMessage::new(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::PacketConstruction(_)));

        let err = PacketBuilder::new()
            .ipv4(SRC_IP, DST_IP)
            .udp(1, 53)
            .dns(DnsMessage::new(1))
            .payload(vec![1])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::PacketConstruction(_)));

        let err = PacketBuilder::new().build().unwrap_err();
        assert_eq!(err, Error::construction("No layers configured"));
    }
}
