//! DNS message, question and resource record codecs
//!
//! Owner names are kept in wire form: literal label bytes or compression
//! pointers into the enclosing message. Pointers are never followed.

pub mod message;
pub mod name;
pub mod record;

pub use message::{DnsMessage, DnsQuestion};
pub use name::RecordName;
pub use record::{DnsResourceRecord, RecordInfo};
