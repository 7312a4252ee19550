//! Decode and encode configuration

/// Limits applied while decoding a PDU chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeConfig {
    /// Maximum number of layers decoded before the rest becomes raw payload
    pub max_depth: usize,
    /// Maximum number of IPv6 extension headers in one packet
    pub max_extension_headers: usize,
}

impl DecodeConfig {
    /// Layers decoded before the rest of a chain is kept raw
    pub const DEFAULT_MAX_DEPTH: usize = 16;
    /// IPv6 extension headers walked before decoding fails
    pub const DEFAULT_MAX_EXTENSION_HEADERS: usize = 8;

    /// Default limits
    pub fn new() -> Self {
        Self {
            max_depth: Self::DEFAULT_MAX_DEPTH,
            max_extension_headers: Self::DEFAULT_MAX_EXTENSION_HEADERS,
        }
    }

    /// Set the maximum chain depth (at least one layer is always decoded)
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Set the maximum number of IPv6 extension headers
    pub fn with_max_extension_headers(mut self, count: usize) -> Self {
        self.max_extension_headers = count;
        self
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Options applied while serializing a PDU chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeConfig {
    /// Recompute IPv4 header, TCP and UDP checksums instead of writing
    /// the stored values
    pub recompute_checksums: bool,
}

impl EncodeConfig {
    /// Default limits
    pub fn new() -> Self {
        Self {
            recompute_checksums: true,
        }
    }

    /// Write every checksum exactly as stored
    pub fn preserve_checksums() -> Self {
        Self {
            recompute_checksums: false,
        }
    }

    /// Choose whether checksums are recomputed or written as stored
    pub fn with_recompute_checksums(mut self, recompute: bool) -> Self {
        self.recompute_checksums = recompute;
        self
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self::new()
    }
}
