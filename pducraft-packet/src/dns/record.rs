//! DNS resource record codec
//!
//! Wire layout (big-endian):
//!
//! ```text
//! [name: pointer(2) | labels + 0x00][type:2][class:2][ttl:4][rdlength:2][rdata]
//! ```
//!
//! Names are never decompressed here: pointer owner names stay pointers, and
//! the data of name-bearing records (NS, CNAME, PTR, MX) is kept verbatim.

use super::name::RecordName;
use crate::cursor::{ByteReader, ByteWriter};
use pducraft_core::dns_types;
use pducraft_core::{Error, Result};

/// The fixed type/class/ttl block that follows the owner name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordInfo {
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
}

impl RecordInfo {
    /// Size of the block on the wire
    pub const SIZE: usize = 8;

    /// Info block with the given type, class and TTL
    pub fn new(rtype: u16, class: u16, ttl: u32) -> Self {
        RecordInfo { rtype, class, ttl }
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let block = reader
            .read_array::<{ Self::SIZE }>()
            .map_err(|_| Error::TruncatedRecordInfo)?;
        Ok(RecordInfo {
            rtype: u16::from_be_bytes([block[0], block[1]]),
            class: u16::from_be_bytes([block[2], block[3]]),
            ttl: u32::from_be_bytes([block[4], block[5], block[6], block[7]]),
        })
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.write(self.rtype)?;
        writer.write(self.class)?;
        writer.write(self.ttl)
    }
}

/// A single answer, authority or additional record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsResourceRecord {
    pub name: RecordName,
    pub info: RecordInfo,
    pub data: Vec<u8>,
}

impl DnsResourceRecord {
    /// Required data length for records that do not carry a domain name
    pub const FIXED_DATA_SIZE: usize = 4;

    /// Record with `data` kept as given
    pub fn new(name: RecordName, info: RecordInfo, data: Vec<u8>) -> Self {
        DnsResourceRecord { name, info, data }
    }

    /// An A record for a literal owner name
    pub fn a(name: &str, ttl: u32, address: std::net::Ipv4Addr) -> Self {
        Self::new(
            RecordName::literal(name),
            RecordInfo::new(dns_types::A, dns_types::CLASS_IN, ttl),
            address.octets().to_vec(),
        )
    }

    /// Decode one record starting at the reader's position. The reader's
    /// end is the end of the enclosing message.
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let name = RecordName::read(reader)?;
        let info = RecordInfo::read(reader)?;

        let length = reader.read::<u16>().map_err(|_| Error::TruncatedLength)? as usize;
        let data = reader.read_bytes(length).map_err(|_| Error::TruncatedData)?;

        if !dns_types::contains_domain_name(info.rtype) && length != Self::FIXED_DATA_SIZE {
            return Err(Error::InvalidDataLength {
                rtype: info.rtype,
                length,
            });
        }

        Ok(DnsResourceRecord {
            name,
            info,
            data: data.to_vec(),
        })
    }

    /// Decode one record from the front of `buffer`, returning it with the
    /// number of bytes consumed
    pub fn from_bytes(buffer: &[u8]) -> Result<(Self, usize)> {
        let mut reader = ByteReader::new(buffer);
        let record = Self::read(&mut reader)?;
        Ok((record, reader.position()))
    }

    /// Encode the record, returning the number of bytes written (always
    /// equal to [`size`](Self::size))
    pub fn write(&self, writer: &mut ByteWriter) -> Result<usize> {
        let length = u16::try_from(self.data.len()).map_err(|_| Error::FieldOverflow {
            field: "rdlength",
            value: self.data.len(),
        })?;

        let name_len = self.name.write(writer)?;
        self.info.write(writer)?;
        writer.write(length)?;
        writer.write_bytes(&self.data)?;

        Ok(name_len + RecordInfo::SIZE + 2 + self.data.len())
    }

    /// Encode into a caller-provided buffer
    pub fn write_to(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut writer = ByteWriter::with_limit(buffer.len());
        let written = self.write(&mut writer)?;
        buffer[..written].copy_from_slice(writer.as_slice());
        Ok(written)
    }

    /// Encode into a fresh buffer of [`size`](Self::size) bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::with_limit(self.size());
        self.write(&mut writer)?;
        Ok(writer.into_vec())
    }

    /// Bytes this record occupies on the wire
    pub fn size(&self) -> usize {
        self.name.wire_size() + RecordInfo::SIZE + 2 + self.data.len()
    }

    /// Whether the record type carries a domain name in its data
    pub fn has_domain_name(&self) -> bool {
        self.name.is_literal()
    }

    /// Literal owner name
    pub fn dname(&self) -> Result<&[u8]> {
        self.name.as_literal().ok_or(Error::TypeMismatch {
            expected: "literal",
            found: self.name.variant_name(),
        })
    }

    /// Compression pointer offset
    pub fn offset(&self) -> Result<u16> {
        self.name.offset().ok_or(Error::TypeMismatch {
            expected: "pointer",
            found: self.name.variant_name(),
        })
    }

    /// Whether the owner name is a literal equal to `candidate`
    pub fn matches(&self, candidate: &str) -> bool {
        self.name.matches(candidate)
    }

    /// Record type
    pub fn rtype(&self) -> u16 {
        self.info.rtype
    }

    /// Record class
    pub fn class(&self) -> u16 {
        self.info.class
    }

    /// Time to live in seconds
    pub fn ttl(&self) -> u32 {
        self.info.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn literal_record_bytes() -> Vec<u8> {
        let mut data = b"example\0".to_vec();
        data.extend_from_slice(&[0x00, 0x01]); // A
        data.extend_from_slice(&[0x00, 0x01]); // IN
        data.extend_from_slice(&300u32.to_be_bytes());
        data.extend_from_slice(&[0x00, 0x04]);
        data.extend_from_slice(&[192, 0, 2, 1]);
        data
    }

    fn pointer_record_bytes() -> Vec<u8> {
        vec![
            0xC0, 0x0C, // pointer to offset 12
            0x00, 0x05, // CNAME
            0x00, 0x01, // IN
            0x00, 0x00, 0x00, 0x3C, // ttl 60
            0x00, 0x02, // rdlength
            0xC0, 0x10, // data
        ]
    }

    #[test]
    fn test_literal_name_record() {
        let bytes = literal_record_bytes();
        let (record, consumed) = DnsResourceRecord::from_bytes(&bytes).unwrap();

        assert_eq!(consumed, 22);
        assert_eq!(record.name, RecordName::literal("example"));
        assert!(record.has_domain_name());
        assert!(record.matches("example"));
        assert!(!record.matches("other"));
        assert_eq!(record.rtype(), dns_types::A);
        assert_eq!(record.class(), dns_types::CLASS_IN);
        assert_eq!(record.ttl(), 300);
        assert_eq!(record.data, vec![192, 0, 2, 1]);
        assert_eq!(record.size(), 22);
        assert_eq!(record.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_pointer_name_record() {
        let bytes = pointer_record_bytes();
        let (record, consumed) = DnsResourceRecord::from_bytes(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(record.name, RecordName::Pointer(12));
        assert_eq!(record.offset().unwrap(), 12);
        assert!(!record.has_domain_name());
        assert!(!record.matches("example"));
        assert_eq!(record.data, vec![0xC0, 0x10]);

        let encoded = record.to_bytes().unwrap();
        assert_eq!(&encoded[..2], &[0xC0, 0x0C]);
        assert_eq!(encoded, bytes);
    }

    #[test]
    fn test_accessor_type_mismatch() {
        let (record, _) = DnsResourceRecord::from_bytes(&pointer_record_bytes()).unwrap();
        assert_eq!(
            record.dname(),
            Err(Error::TypeMismatch {
                expected: "literal",
                found: "pointer"
            })
        );

        let (record, _) = DnsResourceRecord::from_bytes(&literal_record_bytes()).unwrap();
        assert_eq!(record.dname().unwrap(), b"example");
        assert!(matches!(record.offset(), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_non_name_record_length() {
        let mut bytes = literal_record_bytes();
        // rdlength 3, drop one data byte
        let len_at = bytes.len() - 6;
        bytes[len_at + 1] = 3;
        bytes.pop();

        assert_eq!(
            DnsResourceRecord::from_bytes(&bytes).unwrap_err(),
            Error::InvalidDataLength {
                rtype: dns_types::A,
                length: 3
            }
        );

        // A 16-byte AAAA payload is rejected too
        let record = DnsResourceRecord::new(
            RecordName::literal("v6"),
            RecordInfo::new(dns_types::AAAA, dns_types::CLASS_IN, 1),
            vec![0; 16],
        );
        let bytes = record.to_bytes().unwrap();
        assert!(matches!(
            DnsResourceRecord::from_bytes(&bytes),
            Err(Error::InvalidDataLength { length: 16, .. })
        ));
    }

    #[test]
    fn test_truncation_stages() {
        let bytes = literal_record_bytes();

        assert_eq!(
            DnsResourceRecord::from_bytes(&bytes[..5]).unwrap_err(),
            Error::TruncatedName
        );
        assert_eq!(
            DnsResourceRecord::from_bytes(&bytes[..12]).unwrap_err(),
            Error::TruncatedRecordInfo
        );
        assert_eq!(
            DnsResourceRecord::from_bytes(&bytes[..17]).unwrap_err(),
            Error::TruncatedLength
        );
        assert_eq!(
            DnsResourceRecord::from_bytes(&bytes[..19]).unwrap_err(),
            Error::TruncatedData
        );
    }

    #[test]
    fn test_every_truncation_fails() {
        for bytes in [literal_record_bytes(), pointer_record_bytes()] {
            for k in 0..bytes.len() {
                let err = DnsResourceRecord::from_bytes(&bytes[..k]).unwrap_err();
                assert!(err.is_truncation(), "prefix {} gave {:?}", k, err);
            }
        }
    }

    #[test]
    fn test_reads_only_one_record() {
        let mut bytes = pointer_record_bytes();
        bytes.extend_from_slice(&literal_record_bytes());

        let mut reader = ByteReader::new(&bytes);
        let first = DnsResourceRecord::read(&mut reader).unwrap();
        let second = DnsResourceRecord::read(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(first.offset().unwrap(), 12);
        assert!(second.matches("example"));
    }

    #[test]
    fn test_write_to_slice() {
        let record = DnsResourceRecord::a("example", 300, Ipv4Addr::new(192, 0, 2, 1));

        let mut buffer = [0u8; 32];
        let written = record.write_to(&mut buffer).unwrap();
        assert_eq!(written, record.size());
        assert_eq!(&buffer[..written], literal_record_bytes().as_slice());

        let mut small = [0u8; 10];
        assert!(matches!(
            record.write_to(&mut small),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_clone_is_deep() {
        let original = DnsResourceRecord::a("example", 300, Ipv4Addr::new(192, 0, 2, 1));
        let mut copy = original.clone();
        copy.name = RecordName::pointer(12);

        assert!(original.matches("example"));
        assert_eq!(copy.offset().unwrap(), 12);
    }

    #[test]
    fn test_oversized_data() {
        let record = DnsResourceRecord::new(
            RecordName::literal("big"),
            RecordInfo::new(dns_types::CNAME, dns_types::CLASS_IN, 1),
            vec![0; 70_000],
        );
        assert!(matches!(
            record.to_bytes(),
            Err(Error::FieldOverflow { field: "rdlength", .. })
        ));
    }
}
