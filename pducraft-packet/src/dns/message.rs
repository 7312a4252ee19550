//! DNS message codec
//!
//! A message is the 12-byte header followed by the question, answer,
//! authority and additional sections. Section counts are taken from the
//! header on decode and recomputed from the section lengths on encode.

use super::name::RecordName;
use super::record::DnsResourceRecord;
use crate::cursor::{ByteReader, ByteWriter};
use crate::field::BitField;
use crate::pdu::{Layer, LayerCodec, LayerKind, Pdu, WriteContext};
use crate::registry::Decoder;
use pducraft_core::{Error, Result};
use tracing::trace;

const QR: BitField = BitField::new(15, 1);
const OPCODE: BitField = BitField::new(11, 4);
const AA: BitField = BitField::new(10, 1);
const TC: BitField = BitField::new(9, 1);
const RD: BitField = BitField::new(8, 1);
const RA: BitField = BitField::new(7, 1);
const RCODE: BitField = BitField::new(0, 4);

/// An entry of the question section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: RecordName,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuestion {
    /// Question for `name` with the given type and class
    pub fn new(name: RecordName, qtype: u16, qclass: u16) -> Self {
        DnsQuestion {
            name,
            qtype,
            qclass,
        }
    }

    /// Decode one question entry
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let name = RecordName::read(reader)?;
        let qtype = reader
            .read::<u16>()
            .map_err(|_| Error::truncated("DNS question", 4, reader.remaining()))?;
        let qclass = reader
            .read::<u16>()
            .map_err(|_| Error::truncated("DNS question", 2, reader.remaining()))?;
        Ok(DnsQuestion {
            name,
            qtype,
            qclass,
        })
    }

    /// Encode, returning the number of bytes written
    pub fn write(&self, writer: &mut ByteWriter) -> Result<usize> {
        let name_len = self.name.write(writer)?;
        writer.write(self.qtype)?;
        writer.write(self.qclass)?;
        Ok(name_len + 4)
    }

    /// Bytes occupied on the wire
    pub fn size(&self) -> usize {
        self.name.wire_size() + 4
    }
}

/// A complete DNS message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DnsMessage {
    pub id: u16,
    /// Raw flags word; see the accessors for the individual fields
    pub flags: u16,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsResourceRecord>,
    pub authorities: Vec<DnsResourceRecord>,
    pub additionals: Vec<DnsResourceRecord>,
}

impl DnsMessage {
    /// Fixed header size
    pub const HEADER_SIZE: usize = 12;

    /// Empty message with the given ID
    pub fn new(id: u16) -> Self {
        DnsMessage {
            id,
            ..Default::default()
        }
    }

    /// A recursive query for a single name
    pub fn query(id: u16, name: RecordName, qtype: u16, qclass: u16) -> Self {
        let mut message = Self::new(id);
        message.set_recursion_desired(true);
        message.add_question(DnsQuestion::new(name, qtype, qclass));
        message
    }

    /// Append to the question section
    pub fn add_question(&mut self, question: DnsQuestion) {
        self.questions.push(question);
    }

    /// Append to the answer section
    pub fn add_answer(&mut self, record: DnsResourceRecord) {
        self.answers.push(record);
    }

    /// Append to the authority section
    pub fn add_authority(&mut self, record: DnsResourceRecord) {
        self.authorities.push(record);
    }

    /// Append to the additional section
    pub fn add_additional(&mut self, record: DnsResourceRecord) {
        self.additionals.push(record);
    }

    fn flag(&self, field: BitField) -> u16 {
        field.get(self.flags as u32) as u16
    }

    fn set_flag(&mut self, field: BitField, value: u16) {
        self.flags = field.set(self.flags as u32, value as u32) as u16;
    }

    /// QR bit
    pub fn is_response(&self) -> bool {
        self.flag(QR) != 0
    }

    /// Set the QR bit
    pub fn set_response(&mut self, response: bool) {
        self.set_flag(QR, response as u16);
    }

    /// 4-bit operation code
    pub fn opcode(&self) -> u8 {
        self.flag(OPCODE) as u8
    }

    /// Set the operation code; bits above the low 4 are dropped
    pub fn set_opcode(&mut self, opcode: u8) {
        self.set_flag(OPCODE, opcode as u16);
    }

    /// AA bit
    pub fn is_authoritative(&self) -> bool {
        self.flag(AA) != 0
    }

    /// Set the AA bit
    pub fn set_authoritative(&mut self, authoritative: bool) {
        self.set_flag(AA, authoritative as u16);
    }

    /// TC bit
    pub fn is_truncated(&self) -> bool {
        self.flag(TC) != 0
    }

    /// RD bit
    pub fn recursion_desired(&self) -> bool {
        self.flag(RD) != 0
    }

    /// Set the RD bit
    pub fn set_recursion_desired(&mut self, desired: bool) {
        self.set_flag(RD, desired as u16);
    }

    /// RA bit
    pub fn recursion_available(&self) -> bool {
        self.flag(RA) != 0
    }

    /// Set the RA bit
    pub fn set_recursion_available(&mut self, available: bool) {
        self.set_flag(RA, available as u16);
    }

    /// 4-bit response code
    pub fn rcode(&self) -> u8 {
        self.flag(RCODE) as u8
    }

    /// Set the response code; bits above the low 4 are dropped
    pub fn set_rcode(&mut self, rcode: u8) {
        self.set_flag(RCODE, rcode as u16);
    }

    /// First answer whose literal owner name equals `name`
    pub fn find_answer(&self, name: &str) -> Option<&DnsResourceRecord> {
        self.answers.iter().find(|record| record.matches(name))
    }

    /// All records of the three record sections, in wire order
    pub fn records(&self) -> impl Iterator<Item = &DnsResourceRecord> {
        self.answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
    }

    /// Bytes occupied on the wire
    pub fn size(&self) -> usize {
        Self::HEADER_SIZE
            + self.questions.iter().map(DnsQuestion::size).sum::<usize>()
            + self.records().map(DnsResourceRecord::size).sum::<usize>()
    }

    /// Decode a message that starts at the reader's position. Bytes after
    /// the last section are left unread.
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let header = reader
            .read_array::<{ Self::HEADER_SIZE }>()
            .map_err(|_| Error::truncated("DNS", Self::HEADER_SIZE, reader.remaining()))?;
        let word = |at: usize| u16::from_be_bytes([header[at], header[at + 1]]);

        let mut message = DnsMessage::new(word(0));
        message.flags = word(2);

        for _ in 0..word(4) {
            message.questions.push(DnsQuestion::read(reader)?);
        }
        for _ in 0..word(6) {
            message.answers.push(DnsResourceRecord::read(reader)?);
        }
        for _ in 0..word(8) {
            message.authorities.push(DnsResourceRecord::read(reader)?);
        }
        for _ in 0..word(10) {
            message.additionals.push(DnsResourceRecord::read(reader)?);
        }

        Ok(message)
    }

    /// Decode a message occupying all of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let message = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::malformed(
                "DNS",
                format!("{} bytes after the last section", reader.remaining()),
            ));
        }
        Ok(message)
    }

    /// Encode, returning the number of bytes written
    pub fn write(&self, writer: &mut ByteWriter) -> Result<usize> {
        let count = |field: &'static str, len: usize| {
            u16::try_from(len).map_err(|_| Error::FieldOverflow { field, value: len })
        };

        writer.write(self.id)?;
        writer.write(self.flags)?;
        writer.write(count("qdcount", self.questions.len())?)?;
        writer.write(count("ancount", self.answers.len())?)?;
        writer.write(count("nscount", self.authorities.len())?)?;
        writer.write(count("arcount", self.additionals.len())?)?;

        let mut written = Self::HEADER_SIZE;
        for question in &self.questions {
            written += question.write(writer)?;
        }
        for record in self.records() {
            written += record.write(writer)?;
        }
        Ok(written)
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::with_limit(self.size());
        self.write(&mut writer)?;
        Ok(writer.into_vec())
    }
}

impl LayerCodec for DnsMessage {
    const KIND: LayerKind = LayerKind::Dns;

    fn decode(bytes: &[u8], _decoder: &mut Decoder<'_>) -> Result<Pdu> {
        let message = DnsMessage::from_bytes(bytes)?;
        trace!(
            id = message.id,
            response = message.is_response(),
            questions = message.questions.len(),
            answers = message.answers.len(),
            "Decoded DNS message"
        );
        Ok(Pdu::new(message))
    }

    fn header_size(&self) -> usize {
        self.size()
    }

    fn write_header(&self, writer: &mut ByteWriter, _ctx: &WriteContext<'_>) -> Result<()> {
        self.write(writer).map(|_| ())
    }

    fn from_layer(layer: &Layer) -> Option<&Self> {
        match layer {
            Layer::Dns(dns) => Some(dns),
            _ => None,
        }
    }

    fn from_layer_mut(layer: &mut Layer) -> Option<&mut Self> {
        match layer {
            Layer::Dns(dns) => Some(dns),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::RecordInfo;
    use pducraft_core::dns_types;
    use std::net::Ipv4Addr;

    // Response to "example" IN A: one question, one literal A answer and a
    // CNAME answer whose owner points back at the question name
    fn response_bytes() -> Vec<u8> {
        let mut bytes = vec![
            0xbe, 0xef, // id
            0x81, 0x80, // QR, RD, RA
            0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
        ];
        bytes.extend_from_slice(b"example\0");
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        bytes.extend_from_slice(b"example\0");
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x01, 0x2c, 0x00, 0x04]);
        bytes.extend_from_slice(&[192, 0, 2, 1]);
        bytes.extend_from_slice(&[
            0xC0, 0x0C, 0x00, 0x05, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3C, 0x00, 0x02, 0xC0, 0x0C,
        ]);
        bytes
    }

    #[test]
    fn test_decode_response() {
        let bytes = response_bytes();
        let message = DnsMessage::from_bytes(&bytes).unwrap();

        assert_eq!(message.id, 0xbeef);
        assert!(message.is_response());
        assert!(message.recursion_desired());
        assert!(message.recursion_available());
        assert!(!message.is_authoritative());
        assert!(!message.is_truncated());
        assert_eq!(message.opcode(), 0);
        assert_eq!(message.rcode(), 0);

        assert_eq!(message.questions.len(), 1);
        assert_eq!(message.questions[0].name, RecordName::literal("example"));
        assert_eq!(message.answers.len(), 2);
        assert_eq!(message.answers[1].offset().unwrap(), 12);
        assert_eq!(message.size(), bytes.len());
        assert_eq!(message.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_find_answer() {
        let message = DnsMessage::from_bytes(&response_bytes()).unwrap();
        let answer = message.find_answer("example").unwrap();
        assert_eq!(answer.rtype(), dns_types::A);
        assert_eq!(answer.data, vec![192, 0, 2, 1]);
        assert!(message.find_answer("missing").is_none());
    }

    #[test]
    fn test_flag_accessors() {
        let mut message = DnsMessage::new(1);
        message.set_response(true);
        message.set_opcode(2);
        message.set_authoritative(true);
        message.set_rcode(3);
        assert_eq!(message.flags, 0x8000 | (2 << 11) | 0x0400 | 3);
        assert_eq!(message.opcode(), 2);
        assert_eq!(message.rcode(), 3);

        message.set_response(false);
        assert!(!message.is_response());
        assert!(message.is_authoritative());
    }

    #[test]
    fn test_counts_recomputed() {
        let mut message = DnsMessage::query(
            7,
            RecordName::literal("example"),
            dns_types::A,
            dns_types::CLASS_IN,
        );
        message.add_answer(DnsResourceRecord::a("example", 60, Ipv4Addr::new(192, 0, 2, 7)));
        message.add_additional(DnsResourceRecord::new(
            RecordName::pointer(12),
            RecordInfo::new(dns_types::NS, dns_types::CLASS_IN, 60),
            vec![0xC0, 0x0C],
        ));

        let bytes = message.to_bytes().unwrap();
        assert_eq!(&bytes[4..12], &[0, 1, 0, 1, 0, 0, 0, 1]);
        assert_eq!(DnsMessage::from_bytes(&bytes).unwrap(), message);
    }

    #[test]
    fn test_short_header() {
        assert_eq!(
            DnsMessage::from_bytes(&[0; 11]).unwrap_err(),
            Error::truncated("DNS", 12, 11)
        );
    }

    #[test]
    fn test_count_exceeds_records() {
        let mut bytes = response_bytes();
        bytes[7] = 3;
        assert!(DnsMessage::from_bytes(&bytes).unwrap_err().is_truncation());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = response_bytes();
        bytes.push(0);
        assert!(matches!(
            DnsMessage::from_bytes(&bytes),
            Err(Error::Malformed { layer: "DNS", .. })
        ));
    }

    #[test]
    fn test_aaaa_answer_rejected() {
        let mut message = DnsMessage::new(1);
        message.add_answer(DnsResourceRecord::new(
            RecordName::literal("v6"),
            RecordInfo::new(dns_types::AAAA, dns_types::CLASS_IN, 60),
            vec![0; 16],
        ));
        let bytes = message.to_bytes().unwrap();
        assert!(matches!(
            DnsMessage::from_bytes(&bytes),
            Err(Error::InvalidDataLength { rtype: 28, .. })
        ));
    }
}
