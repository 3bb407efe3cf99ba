use crate::RecordType;

/// Fixed DNS header size on the wire.
pub const HEADER_LEN: usize = 12;

/// Classic UDP message budget; also the minimum buffer `encode` accepts.
pub const MAX_MESSAGE_LEN: usize = 512;

/// Longest domain name, in bytes, in either textual or wire form.
pub const MAX_NAME_LEN: usize = 255;

pub const MAX_LABEL_LEN: usize = 63;

/// Standard query (opcode 0) with recursion desired.
pub const FLAGS_STANDARD_QUERY: u16 = 0x0100;

pub const CLASS_IN: u16 = 1;

const RCODE_MASK: u16 = 0x000F;
const QR_BIT: u16 = 0x8000;

/// The six 16-bit header fields, in host byte order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DnsHeader {
    pub fn rcode(&self) -> u8 {
        (self.flags & RCODE_MASK) as u8
    }

    pub fn is_response(&self) -> bool {
        self.flags & QR_BIT != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    /// Dotted name without trailing dot, e.g. `"example.com"`.
    pub name: String,
    pub qtype: RecordType,
    pub qclass: u16,
}

/// A header plus at most one question. Decoded responses carry only the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    pub header: DnsHeader,
    pub question: Option<DnsQuestion>,
}

impl DnsMessage {
    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// Question name, or `""` when the message was decoded header-only.
    pub fn name(&self) -> &str {
        self.question.as_ref().map(|q| q.name.as_str()).unwrap_or("")
    }

    pub fn qtype(&self) -> Option<RecordType> {
        self.question.as_ref().map(|q| q.qtype)
    }
}
