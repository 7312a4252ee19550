//! Example: Building a DNS answer
//!
//! This example builds an Ethernet/IPv4/UDP packet carrying a DNS response
//! whose answer owner name is a compression pointer back to the question.

use pducraft_core::{dns_types, DecodeConfig, MacAddr};
use pducraft_packet::dns::{DnsMessage, DnsResourceRecord, RecordInfo, RecordName};
use pducraft_packet::{LayerKind, LayerRegistry, PacketBuilder, Pdu};
use std::net::Ipv4Addr;

fn main() {
    // Network addresses
    let src_mac = MacAddr::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    let dst_mac = MacAddr::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    let resolver = Ipv4Addr::new(192, 168, 1, 1);
    let client = Ipv4Addr::new(192, 168, 1, 100);

    let mut response = DnsMessage::query(
        0x1234,
        RecordName::from_domain("example.com").expect("valid domain"),
        dns_types::A,
        dns_types::CLASS_IN,
    );
    response.set_response(true);
    response.set_recursion_available(true);

    // The question name starts right after the 12-byte header
    response.add_answer(DnsResourceRecord::new(
        RecordName::pointer(DnsMessage::HEADER_SIZE as u16),
        RecordInfo::new(dns_types::A, dns_types::CLASS_IN, 3600),
        Ipv4Addr::new(93, 184, 216, 34).octets().to_vec(),
    ));

    let pdu = PacketBuilder::new()
        .ethernet(src_mac, dst_mac)
        .ipv4(resolver, client)
        .ttl(64)
        .udp(53, 54321)
        .dns(response)
        .build()
        .expect("Failed to build DNS packet");

    let bytes = pdu.serialize().expect("Failed to serialize DNS packet");

    println!("DNS answer built successfully!");
    println!("Layers: {}", pdu);
    println!("Total size: {} bytes", bytes.len());
    println!("DNS message: {:02X?}", &bytes[42..]);

    // Decode it again with DNS bound to its port
    let registry = LayerRegistry::new().with_dns_port(53);
    let decoded = Pdu::decode_with(
        LayerKind::Ethernet,
        &bytes,
        &registry,
        &DecodeConfig::default(),
    )
    .expect("Failed to decode DNS packet");

    let message = decoded.find::<DnsMessage>().expect("DNS layer");
    for record in &message.answers {
        println!(
            "Answer: name {} type {} ttl {} data {:?}",
            record.name,
            record.rtype(),
            record.ttl(),
            record.data
        );
    }
    println!("Decoded chain equals built chain: {}", decoded == pdu);
}
