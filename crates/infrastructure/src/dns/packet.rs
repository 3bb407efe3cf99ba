//! Ethernet II / IPv4 / UDP framing around DNS payloads, parsed and
//! rewritten in place.

pub const ETH_HEADER_LEN: usize = 14;
pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

const ETHERTYPE_IPV4: u16 = 0x0800;
const IPPROTO_UDP: u8 = 17;
const IPV4_MORE_FRAGMENTS: u16 = 0x2000;
const IPV4_FRAGMENT_OFFSET: u16 = 0x1FFF;
const REPLY_TTL: u8 = 64;

/// Header offsets of an unfragmented IPv4/UDP datagram inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpFrame {
    pub ip_offset: usize,
    pub ip_header_len: usize,
    pub udp_offset: usize,
    pub payload_offset: usize,
    pub payload_len: usize,
}

impl UdpFrame {
    pub fn src_port(&self, frame: &[u8]) -> u16 {
        u16::from_be_bytes([frame[self.udp_offset], frame[self.udp_offset + 1]])
    }

    pub fn dst_port(&self, frame: &[u8]) -> u16 {
        u16::from_be_bytes([frame[self.udp_offset + 2], frame[self.udp_offset + 3]])
    }

    pub fn payload<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        &frame[self.payload_offset..self.payload_offset + self.payload_len]
    }
}

/// Locates the UDP payload of an Ethernet frame.
///
/// `None` for anything but a complete, unfragmented IPv4/UDP datagram.
pub fn parse_udp(frame: &[u8]) -> Option<UdpFrame> {
    if frame.len() < ETH_HEADER_LEN + IPV4_MIN_HEADER_LEN + UDP_HEADER_LEN {
        return None;
    }
    if u16::from_be_bytes([frame[12], frame[13]]) != ETHERTYPE_IPV4 {
        return None;
    }

    let ip = ETH_HEADER_LEN;
    let version = frame[ip] >> 4;
    let ip_header_len = (frame[ip] & 0x0F) as usize * 4;
    if version != 4 || ip_header_len < IPV4_MIN_HEADER_LEN {
        return None;
    }
    if frame[ip + 9] != IPPROTO_UDP {
        return None;
    }
    let frag = u16::from_be_bytes([frame[ip + 6], frame[ip + 7]]);
    if frag & (IPV4_MORE_FRAGMENTS | IPV4_FRAGMENT_OFFSET) != 0 {
        return None;
    }

    let udp = ip + ip_header_len;
    if frame.len() < udp + UDP_HEADER_LEN {
        return None;
    }
    let udp_len = u16::from_be_bytes([frame[udp + 4], frame[udp + 5]]) as usize;
    if udp_len < UDP_HEADER_LEN {
        return None;
    }
    let payload_offset = udp + UDP_HEADER_LEN;
    let payload_len = udp_len - UDP_HEADER_LEN;
    if payload_offset + payload_len > frame.len() {
        return None;
    }

    Some(UdpFrame {
        ip_offset: ip,
        ip_header_len,
        udp_offset: udp,
        payload_offset,
        payload_len,
    })
}

/// Turns a received datagram into a reply to its sender, carrying
/// `payload_len` bytes already placed at `udp.payload_offset`.
///
/// Swaps MAC addresses, IPv4 addresses and ports, then fixes lengths and the
/// IPv4 checksum. The UDP checksum is cleared (optional over IPv4).
/// Returns the reply's total frame length.
pub fn reflect(frame: &mut [u8], udp: &UdpFrame, payload_len: usize) -> usize {
    let (dst_mac, rest) = frame.split_at_mut(6);
    dst_mac.swap_with_slice(&mut rest[..6]);

    let ip = udp.ip_offset;
    let (src_ip, dst_ip) = frame[ip + 12..ip + 20].split_at_mut(4);
    src_ip.swap_with_slice(dst_ip);

    let u = udp.udp_offset;
    let (src_port, dst_port) = frame[u..u + 4].split_at_mut(2);
    src_port.swap_with_slice(dst_port);

    let udp_len = (UDP_HEADER_LEN + payload_len) as u16;
    let total_len = udp.ip_header_len as u16 + udp_len;
    frame[ip + 2..ip + 4].copy_from_slice(&total_len.to_be_bytes());
    frame[ip + 8] = REPLY_TTL;
    frame[ip + 10..ip + 12].fill(0);
    let checksum = ipv4_checksum(&frame[ip..ip + udp.ip_header_len]);
    frame[ip + 10..ip + 12].copy_from_slice(&checksum.to_be_bytes());

    frame[u + 4..u + 6].copy_from_slice(&udp_len.to_be_bytes());
    frame[u + 6..u + 8].fill(0);

    udp.payload_offset + payload_len
}

/// Ones-complement sum over an IPv4 header.
pub fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]) as u32,
            [hi] => (*hi as u32) << 8,
            _ => 0,
        })
        .sum();
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
