//! Example: Decoding captured packets
//!
//! Decodes two IPv6 captures given as hex, prints every layer, and shows
//! how checksum handling affects re-serialization.

use pducraft_core::EncodeConfig;
use pducraft_packet::{ExtensionHeader, Ipv6Packet, Layer, LayerKind, Pdu};

// IPv6 + TCP SYN whose checksum was left to the NIC
const TCP_CAPTURE: &str = "69a82734002806400000000000000000000000000000000100000000000000000000000000000001c68c00506848030c00000000a0027ff00030000002043ff80402080a0084a39c0000000001030307";

// IPv6 hop-by-hop + ICMPv6 MLD report
const HOP_BY_HOP_CAPTURE: &str = "6000000000240001fe8000000000000002d009fffee3e8deff0200000000000000000000000000163a000502000001008f0074fe0000000104000000ff0200000000000000000001ff9806e1";

fn hex(text: &str) -> Vec<u8> {
    (0..text.len())
        .step_by(2)
        .filter_map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

fn describe(layer: &Layer) -> String {
    match layer {
        Layer::Ipv6(ip) => format!(
            "IPv6 {} -> {} hop_limit={} next_header={} extensions={:?} upper={}",
            ip.source,
            ip.destination,
            ip.hop_limit,
            ip.next_header,
            ip.extension_headers()
                .iter()
                .map(ExtensionHeader::kind)
                .collect::<Vec<_>>(),
            ip.upper_layer_protocol()
        ),
        Layer::Tcp(tcp) => format!(
            "TCP {} -> {} flags={} checksum=0x{:04x}",
            tcp.source_port, tcp.destination_port, tcp.flags, tcp.checksum
        ),
        Layer::Raw(raw) => format!("Raw {} bytes", raw.len()),
        other => other.kind().to_string(),
    }
}

fn main() {
    for (name, capture) in [("tcp", TCP_CAPTURE), ("hop-by-hop", HOP_BY_HOP_CAPTURE)] {
        let bytes = hex(capture);
        let pdu = match Pdu::decode(LayerKind::Ipv6, &bytes) {
            Ok(pdu) => pdu,
            Err(e) => {
                eprintln!("{}: decode failed: {}", name, e);
                continue;
            }
        };

        println!("{} ({} bytes): {}", name, bytes.len(), pdu);
        for layer in &pdu {
            println!("  {}", describe(layer));
        }

        if let Some(ip) = pdu.find::<Ipv6Packet>() {
            println!("  payload length: {}", ip.payload_length);
        }

        let preserved = pdu
            .serialize_with(&EncodeConfig::preserve_checksums())
            .map(|out| out == bytes);
        let recomputed = pdu.serialize().map(|out| out == bytes);
        println!("  identical with stored checksums: {:?}", preserved);
        println!("  identical with recomputed checksums: {:?}", recomputed);
    }
}
