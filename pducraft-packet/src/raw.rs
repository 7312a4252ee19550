//! Opaque payload bytes

use crate::cursor::ByteWriter;
use crate::pdu::{Layer, LayerCodec, LayerKind, Pdu, WriteContext};
use crate::registry::Decoder;
use bytes::Bytes;
use pducraft_core::Result;
use tracing::trace;

/// Bytes no registered decoder claimed; always a leaf
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawPayload {
    pub data: Bytes,
}

impl RawPayload {
    /// Wrap `data` as an opaque payload
    pub fn new<B: Into<Bytes>>(data: B) -> Self {
        RawPayload { data: data.into() }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload has no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl LayerCodec for RawPayload {
    const KIND: LayerKind = LayerKind::Raw;

    fn decode(bytes: &[u8], _decoder: &mut Decoder<'_>) -> Result<Pdu> {
        trace!(len = bytes.len(), "Decoded raw payload");
        Ok(Pdu::new(RawPayload::new(Bytes::copy_from_slice(bytes))))
    }

    fn header_size(&self) -> usize {
        self.data.len()
    }

    fn write_header(&self, writer: &mut ByteWriter, _ctx: &WriteContext<'_>) -> Result<()> {
        writer.write_bytes(&self.data)
    }

    fn from_layer(layer: &Layer) -> Option<&Self> {
        match layer {
            Layer::Raw(raw) => Some(raw),
            _ => None,
        }
    }

    fn from_layer_mut(layer: &mut Layer) -> Option<&mut Self> {
        match layer {
            Layer::Raw(raw) => Some(raw),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_takes_everything() {
        let pdu = Pdu::decode(LayerKind::Raw, &[1, 2, 3, 4]).unwrap();
        let raw = pdu.find::<RawPayload>().unwrap();
        assert_eq!(raw.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(raw.len(), 4);
        assert!(pdu.inner().is_none());
        assert_eq!(pdu.serialize().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_raw() {
        let raw = RawPayload::default();
        assert!(raw.is_empty());
        assert_eq!(Pdu::new(raw).size(), 0);
    }
}
