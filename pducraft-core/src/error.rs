//! Error types for pducraft

use thiserror::Error;

/// Result type alias for pducraft operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pducraft
///
/// Decode errors are raised by the call that first notices the problem and
/// abort construction of the layer being decoded; nothing partially built is
/// ever returned alongside them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A cursor read or write ran past the end of its buffer
    #[error("Out of bounds: needed {needed} bytes, {remaining} remaining")]
    OutOfBounds { needed: usize, remaining: usize },

    /// DNS record owner name has no terminator before the end of the message
    #[error("Not enough size for a resource domain name")]
    TruncatedName,

    /// DNS record type/class/ttl block does not fit
    #[error("Not enough size for a resource info")]
    TruncatedRecordInfo,

    /// DNS record data length field does not fit
    #[error("Not enough size for resource data size")]
    TruncatedLength,

    /// DNS record data is shorter than its declared length
    #[error("Not enough size for resource data")]
    TruncatedData,

    /// Non-name DNS record whose data is not exactly 4 bytes
    #[error("Invalid data length {length} for record type {rtype}")]
    InvalidDataLength { rtype: u16, length: usize },

    /// Name accessor used on the other name representation
    #[error("Type mismatch: expected {expected} name, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A header or a declared length does not fit in the available bytes
    #[error("Truncated {layer}: needed {needed} bytes, {available} available")]
    Truncated {
        layer: &'static str,
        needed: usize,
        available: usize,
    },

    /// Structurally invalid header contents
    #[error("Malformed {layer}: {reason}")]
    Malformed { layer: &'static str, reason: String },

    /// IPv6 extension header chain longer than the configured limit
    #[error("Extension header chain exceeds {limit} headers")]
    ExtensionChainTooLong { limit: usize },

    /// A computed value does not fit in its wire field
    #[error("Value {value} does not fit in field '{field}'")]
    FieldOverflow { field: &'static str, value: usize },

    /// Packet construction error
    #[error("Packet construction error: {0}")]
    PacketConstruction(String),
}

impl Error {
    /// Create a malformed-header error with a custom message
    pub fn malformed<S: Into<String>>(layer: &'static str, reason: S) -> Self {
        Error::Malformed {
            layer,
            reason: reason.into(),
        }
    }

    /// Create a truncation error for `layer`
    pub fn truncated(layer: &'static str, needed: usize, available: usize) -> Self {
        Error::Truncated {
            layer,
            needed,
            available,
        }
    }

    /// Create a packet construction error with a custom message
    pub fn construction<S: Into<String>>(msg: S) -> Self {
        Error::PacketConstruction(msg.into())
    }

    /// Whether this error means the input simply ran out of bytes
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            Error::OutOfBounds { .. }
                | Error::TruncatedName
                | Error::TruncatedRecordInfo
                | Error::TruncatedLength
                | Error::TruncatedData
                | Error::Truncated { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_classification() {
        assert!(Error::TruncatedName.is_truncation());
        assert!(Error::truncated("IPv6", 40, 12).is_truncation());
        assert!(Error::OutOfBounds {
            needed: 2,
            remaining: 1
        }
        .is_truncation());
        assert!(!Error::InvalidDataLength { rtype: 1, length: 3 }.is_truncation());
        assert!(!Error::malformed("IPv4", "bad version").is_truncation());
    }

    #[test]
    fn test_error_display() {
        let err = Error::truncated("TCP", 20, 8);
        assert_eq!(err.to_string(), "Truncated TCP: needed 20 bytes, 8 available");

        let err = Error::construction("missing network layer");
        assert_eq!(
            err.to_string(),
            "Packet construction error: missing network layer"
        );
    }
}
