#![allow(dead_code)]
use whack_domain::{DnsMessage, RecordType};
use whack_infrastructure::dns::codec;
use whack_infrastructure::dns::QueryBuilder;

pub const RESPONSE_FLAGS: u16 = 0x8180;

/// Builds DNS messages on the wire for tests.
pub struct MessageBuilder {
    queries: QueryBuilder,
    flags: u16,
    qtype: RecordType,
}

impl MessageBuilder {
    pub fn response() -> Self {
        Self {
            queries: QueryBuilder::new(),
            flags: RESPONSE_FLAGS,
            qtype: RecordType::A,
        }
    }

    pub fn with_rcode(mut self, rcode: u16) -> Self {
        self.flags = (self.flags & !0x000F) | (rcode & 0x000F);
        self
    }

    pub fn with_qtype(mut self, qtype: RecordType) -> Self {
        self.qtype = qtype;
        self
    }

    pub fn message(&mut self, name: &str) -> DnsMessage {
        let mut msg = self.queries.build_query(name, self.qtype);
        msg.header.flags = self.flags;
        msg
    }

    pub fn bytes(&mut self, name: &str) -> Vec<u8> {
        let msg = self.message(name);
        let mut out = [0u8; 512];
        let len = codec::encode(&msg, &mut out).unwrap();
        out[..len].to_vec()
    }
}

/// Ethernet II / IPv4 / UDP frame from 10.0.0.53:53 to 10.0.0.7:40000.
pub struct UdpFrameBuilder {
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    src_port: u16,
    dst_port: u16,
    ip_options: Vec<u8>,
    flags_fragment: u16,
    protocol: u8,
}

impl Default for UdpFrameBuilder {
    fn default() -> Self {
        Self {
            src_mac: [0x02, 0, 0, 0, 0, 0x02],
            dst_mac: [0x02, 0, 0, 0, 0, 0x01],
            src_ip: [10, 0, 0, 53],
            dst_ip: [10, 0, 0, 7],
            src_port: 53,
            dst_port: 40000,
            ip_options: Vec::new(),
            flags_fragment: 0,
            protocol: 17,
        }
    }
}

impl UdpFrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ip_options(mut self, options: &[u8]) -> Self {
        self.ip_options = options.to_vec();
        self
    }

    pub fn with_more_fragments(mut self) -> Self {
        self.flags_fragment = 0x2000;
        self
    }

    pub fn with_protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn build(&self, payload: &[u8]) -> Vec<u8> {
        let ihl = 20 + self.ip_options.len();
        let mut frame = Vec::with_capacity(14 + ihl + 8 + payload.len());
        frame.extend_from_slice(&self.dst_mac);
        frame.extend_from_slice(&self.src_mac);
        frame.extend_from_slice(&0x0800u16.to_be_bytes());

        frame.push(0x40 | (ihl / 4) as u8);
        frame.push(0);
        frame.extend_from_slice(&((ihl + 8 + payload.len()) as u16).to_be_bytes());
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&self.flags_fragment.to_be_bytes());
        frame.push(64);
        frame.push(self.protocol);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&self.src_ip);
        frame.extend_from_slice(&self.dst_ip);
        frame.extend_from_slice(&self.ip_options);

        frame.extend_from_slice(&self.src_port.to_be_bytes());
        frame.extend_from_slice(&self.dst_port.to_be_bytes());
        frame.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(payload);
        frame
    }
}
