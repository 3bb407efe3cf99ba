use compact_str::CompactString;
use whack_domain::dns_message::{HEADER_LEN, MAX_LABEL_LEN, MAX_MESSAGE_LEN, MAX_NAME_LEN};
use whack_domain::{CodecError, DnsHeader, DnsMessage};

const POINTER_MASK: u8 = 0xC0;
const QUESTION_TAIL_LEN: usize = 4;

/// Serializes a message (header and optional question) into `out`.
///
/// `out` must hold at least [`MAX_MESSAGE_LEN`] bytes. Everything is
/// validated before the first byte is written, so on error `out` is untouched.
pub fn encode(message: &DnsMessage, out: &mut [u8]) -> Result<usize, CodecError> {
    if out.len() < MAX_MESSAGE_LEN {
        return Err(CodecError::BufferTooSmall {
            needed: MAX_MESSAGE_LEN,
            available: out.len(),
        });
    }

    let name_len = match &message.question {
        Some(q) => encoded_name_len(&q.name)?,
        None => 0,
    };
    let total = HEADER_LEN
        + message
            .question
            .as_ref()
            .map_or(0, |_| name_len + QUESTION_TAIL_LEN);
    if total > out.len() {
        return Err(CodecError::BufferTooSmall {
            needed: total,
            available: out.len(),
        });
    }

    write_header(&message.header, out);
    let mut pos = HEADER_LEN;
    if let Some(q) = &message.question {
        pos += write_name(&q.name, &mut out[pos..]);
        out[pos..pos + 2].copy_from_slice(&q.qtype.to_u16().to_be_bytes());
        out[pos + 2..pos + 4].copy_from_slice(&q.qclass.to_be_bytes());
        pos += QUESTION_TAIL_LEN;
    }
    Ok(pos)
}

/// Wire form of a dotted name: length-prefixed labels and a terminating zero.
pub fn encode_name(name: &str, out: &mut [u8]) -> Result<usize, CodecError> {
    let needed = encoded_name_len(name)?;
    if needed > out.len() {
        return Err(CodecError::BufferTooSmall {
            needed,
            available: out.len(),
        });
    }
    Ok(write_name(name, out))
}

/// Validates every label and returns the encoded length.
pub fn encoded_name_len(name: &str) -> Result<usize, CodecError> {
    let mut len = 1;
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(CodecError::InvalidLabel(label.to_string()));
        }
        len += 1 + label.len();
    }
    if len > MAX_NAME_LEN {
        return Err(CodecError::NameTooLong(len));
    }
    Ok(len)
}

fn write_name(name: &str, out: &mut [u8]) -> usize {
    let mut pos = 0;
    for label in name.split('.') {
        out[pos] = label.len() as u8;
        out[pos + 1..pos + 1 + label.len()].copy_from_slice(label.as_bytes());
        pos += 1 + label.len();
    }
    out[pos] = 0;
    pos + 1
}

fn write_header(header: &DnsHeader, out: &mut [u8]) {
    let fields = [
        header.id,
        header.flags,
        header.qdcount,
        header.ancount,
        header.nscount,
        header.arcount,
    ];
    for (i, field) in fields.iter().enumerate() {
        out[i * 2..i * 2 + 2].copy_from_slice(&field.to_be_bytes());
    }
}

pub fn decode_header(bytes: &[u8]) -> Result<DnsHeader, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::TooShort(bytes.len()));
    }
    let field = |i: usize| u16::from_be_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
    Ok(DnsHeader {
        id: field(0),
        flags: field(1),
        qdcount: field(2),
        ancount: field(3),
        nscount: field(4),
        arcount: field(5),
    })
}

/// Parses the header of a response and rejects non-zero RCODEs.
///
/// Only the header is decoded; the returned message has no question.
pub fn decode_response(bytes: &[u8]) -> Result<DnsMessage, CodecError> {
    let header = decode_header(bytes)?;
    let rcode = header.rcode();
    if rcode != 0 {
        return Err(CodecError::UpstreamError { rcode });
    }
    Ok(DnsMessage {
        header,
        question: None,
    })
}

/// Reads the first question's name and the offset just past it.
///
/// The name comes back in presentation form: ASCII letters lowercased, `.`
/// and `\` inside a label escaped with a backslash, and any other byte
/// outside printable ASCII written as `\DDD`. Distinct wire names therefore
/// never share a string. The root name decodes to `"."`. Compression
/// pointers are rejected: a question name is always the first name in the
/// message.
pub fn question_name(bytes: &[u8]) -> Result<(CompactString, usize), CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::TooShort(bytes.len()));
    }

    let mut name = CompactString::default();
    let mut pos = HEADER_LEN;
    loop {
        let Some(&len) = bytes.get(pos) else {
            return Err(CodecError::Malformed("truncated question name"));
        };
        pos += 1;
        if len == 0 {
            break;
        }
        if len & POINTER_MASK != 0 {
            return Err(CodecError::Malformed("compressed question name"));
        }
        let label = bytes
            .get(pos..pos + len as usize)
            .ok_or(CodecError::Malformed("truncated question name"))?;
        if pos - HEADER_LEN + label.len() + 1 > MAX_NAME_LEN {
            return Err(CodecError::Malformed("question name too long"));
        }
        if !name.is_empty() {
            name.push('.');
        }
        for &b in label {
            push_label_byte(&mut name, b);
        }
        pos += label.len();
    }

    if name.is_empty() {
        name.push('.');
    }
    Ok((name, pos))
}

fn push_label_byte(name: &mut CompactString, b: u8) {
    match b {
        b'.' | b'\\' => {
            name.push('\\');
            name.push(b as char);
        }
        0x21..=0x7E => name.push(b.to_ascii_lowercase() as char),
        _ => {
            name.push('\\');
            for digit in [b / 100, b / 10 % 10, b % 10] {
                name.push((b'0' + digit) as char);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_length_counts_prefixes_and_terminator() {
        assert_eq!(encoded_name_len("example.com").unwrap(), 13);
        assert_eq!(encoded_name_len("a").unwrap(), 3);
    }

    #[test]
    fn test_write_header_layout() {
        let mut out = [0u8; HEADER_LEN];
        write_header(
            &DnsHeader {
                id: 0x1234,
                flags: 0x0100,
                qdcount: 1,
                ..Default::default()
            },
            &mut out,
        );
        assert_eq!(out, [0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0]);
    }
}
