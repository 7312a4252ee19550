//! Owner-name representations used by DNS records and questions

use crate::cursor::{ByteReader, ByteWriter};
use pducraft_core::{Error, Result};
use std::fmt;

/// The two high bits that mark a compression pointer
const POINTER_FLAG: u8 = 0xC0;
const POINTER_MASK: u16 = 0x3FFF;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

/// How a record's owner name appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordName {
    /// Label bytes as they appear on the wire, without the terminating zero
    Literal(Vec<u8>),
    /// 14-bit offset of an earlier name in the enclosing message
    Pointer(u16),
}

impl RecordName {
    /// Largest offset a compression pointer can express
    pub const MAX_OFFSET: u16 = POINTER_MASK;

    /// Literal name from its label bytes, without the terminator
    pub fn literal<B: Into<Vec<u8>>>(name: B) -> Self {
        RecordName::Literal(name.into())
    }

    /// Build a pointer; bits above the 14-bit offset are dropped
    pub fn pointer(offset: u16) -> Self {
        RecordName::Pointer(offset & POINTER_MASK)
    }

    /// Bytes this name occupies on the wire
    pub fn wire_size(&self) -> usize {
        match self {
            RecordName::Literal(name) => name.len() + 1,
            RecordName::Pointer(_) => 2,
        }
    }

    /// Whether the name is spelled out rather than pointed to
    pub fn is_literal(&self) -> bool {
        matches!(self, RecordName::Literal(_))
    }

    /// Label bytes of a literal name
    pub fn as_literal(&self) -> Option<&[u8]> {
        match self {
            RecordName::Literal(name) => Some(name),
            RecordName::Pointer(_) => None,
        }
    }

    /// Message offset of a compression pointer
    pub fn offset(&self) -> Option<u16> {
        match self {
            RecordName::Pointer(offset) => Some(*offset),
            RecordName::Literal(_) => None,
        }
    }

    /// Exact, case-sensitive comparison; pointers never match
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            RecordName::Literal(name) => name.as_slice() == candidate.as_bytes(),
            RecordName::Pointer(_) => false,
        }
    }

    /// Literal name in label form from dotted text, e.g. `www.example.com`
    pub fn from_domain(domain: &str) -> Result<Self> {
        let mut wire = Vec::with_capacity(domain.len() + 1);
        for label in domain.split('.').filter(|label| !label.is_empty()) {
            if label.len() > MAX_LABEL_LEN {
                return Err(Error::malformed(
                    "DNS",
                    format!("label '{}' longer than {} bytes", label, MAX_LABEL_LEN),
                ));
            }
            wire.push(label.len() as u8);
            wire.extend_from_slice(label.as_bytes());
        }

        if wire.len() + 1 > MAX_NAME_LEN {
            return Err(Error::malformed("DNS", "name longer than 255 bytes"));
        }
        Ok(RecordName::Literal(wire))
    }

    /// Dotted text of a literal name in label form. `None` for pointers and
    /// for literals whose label lengths do not add up.
    pub fn to_domain(&self) -> Option<String> {
        let mut rest = self.as_literal()?;
        let mut labels = Vec::new();
        while let Some((&len, tail)) = rest.split_first() {
            let label = tail.get(..len as usize)?;
            labels.push(String::from_utf8_lossy(label));
            rest = &tail[len as usize..];
        }
        Some(labels.join("."))
    }

    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            RecordName::Literal(_) => "literal",
            RecordName::Pointer(_) => "pointer",
        }
    }

    /// Decode a name at the reader's position.
    ///
    /// A first byte with both high bits set starts a pointer. Anything else
    /// is a literal that runs up to the first zero byte; running out of
    /// bytes on either path is [`Error::TruncatedName`].
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let first = reader.peek_u8().map_err(|_| Error::TruncatedName)?;

        if first & POINTER_FLAG == POINTER_FLAG {
            let raw = reader.read::<u16>().map_err(|_| Error::TruncatedName)?;
            return Ok(RecordName::Pointer(raw & POINTER_MASK));
        }

        let len = reader.find(0).ok_or(Error::TruncatedName)?;
        let name = reader.read_bytes(len)?.to_vec();
        reader.skip(1)?;
        Ok(RecordName::Literal(name))
    }

    /// Encode the name, returning the number of bytes written
    pub fn write(&self, writer: &mut ByteWriter) -> Result<usize> {
        match self {
            RecordName::Pointer(offset) => {
                writer.write(((POINTER_FLAG as u16) << 8) | (offset & POINTER_MASK))?;
            }
            RecordName::Literal(name) => {
                writer.write_bytes(name)?;
                writer.write(0u8)?;
            }
        }
        Ok(self.wire_size())
    }
}

impl fmt::Display for RecordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordName::Literal(name) => write!(f, "{}", String::from_utf8_lossy(name)),
            RecordName::Pointer(offset) => write!(f, "@{}", offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_literal() {
        let data = b"example\0rest";
        let mut reader = ByteReader::new(data);

        let name = RecordName::read(&mut reader).unwrap();
        assert_eq!(name, RecordName::literal("example"));
        assert_eq!(name.wire_size(), 8);
        assert_eq!(reader.rest(), b"rest");
    }

    #[test]
    fn test_read_pointer() {
        let data = [0xC0, 0x0C, 0x00, 0x05];
        let mut reader = ByteReader::new(&data);

        let name = RecordName::read(&mut reader).unwrap();
        assert_eq!(name.offset(), Some(12));
        assert!(!name.is_literal());
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_single_high_bit_is_literal() {
        // Only 0b11 in the top bits marks a pointer
        let data = [0x80, 0x41, 0x00];
        let mut reader = ByteReader::new(&data);

        let name = RecordName::read(&mut reader).unwrap();
        assert_eq!(name.as_literal(), Some(&[0x80, 0x41][..]));
    }

    #[test]
    fn test_unterminated_literal() {
        let mut reader = ByteReader::new(b"example");
        assert_eq!(RecordName::read(&mut reader), Err(Error::TruncatedName));

        let mut reader = ByteReader::new(&[0xC0]);
        assert_eq!(RecordName::read(&mut reader), Err(Error::TruncatedName));

        let mut reader = ByteReader::new(&[]);
        assert_eq!(RecordName::read(&mut reader), Err(Error::TruncatedName));
    }

    #[test]
    fn test_write_forces_pointer_bits() {
        let mut writer = ByteWriter::new();
        let written = RecordName::pointer(0x3FFF).write(&mut writer).unwrap();
        assert_eq!(written, 2);
        assert_eq!(writer.as_slice(), &[0xFF, 0xFF]);

        let mut writer = ByteWriter::new();
        RecordName::pointer(0xC00C).write(&mut writer).unwrap();
        assert_eq!(writer.as_slice(), &[0xC0, 0x0C]);
    }

    #[test]
    fn test_write_literal_terminator() {
        let mut writer = ByteWriter::new();
        let written = RecordName::literal("abc").write(&mut writer).unwrap();
        assert_eq!(written, 4);
        assert_eq!(writer.as_slice(), b"abc\0");
    }

    #[test]
    fn test_domain_labels() {
        let name = RecordName::from_domain("www.example.com").unwrap();
        assert_eq!(name.as_literal().unwrap(), b"\x03www\x07example\x03com");
        assert_eq!(name.wire_size(), 17);
        assert_eq!(name.to_domain().unwrap(), "www.example.com");

        // Trailing root dot is accepted
        assert_eq!(RecordName::from_domain("example.com.").unwrap().wire_size(), 13);

        assert!(RecordName::from_domain(&"a".repeat(64)).is_err());
        assert!(RecordName::literal(vec![5, b'a']).to_domain().is_none());
        assert!(RecordName::pointer(12).to_domain().is_none());
    }

    #[test]
    fn test_matches() {
        let name = RecordName::literal("example");
        assert!(name.matches("example"));
        assert!(!name.matches("Example"));
        assert!(!name.matches("other"));
        assert!(!RecordName::pointer(12).matches("example"));
    }
}
