use whack_domain::dns_message::{CLASS_IN, FLAGS_STANDARD_QUERY};
use whack_domain::{DnsHeader, DnsMessage, DnsQuestion, RecordType};

/// Builds recursive standard queries with sequential transaction ids.
///
/// The id counter belongs to the builder, so independent builders never
/// share or race on ids. Ids start at 1 and wrap from 65535 to 0.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    last_id: u16,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next query will carry `id`.
    pub fn starting_at(id: u16) -> Self {
        Self {
            last_id: id.wrapping_sub(1),
        }
    }

    /// A single-question `IN` query for `domain`. The name is not validated
    /// here; `encode` rejects bad labels.
    pub fn build_query(&mut self, domain: &str, qtype: RecordType) -> DnsMessage {
        self.last_id = self.last_id.wrapping_add(1);
        DnsMessage {
            header: DnsHeader {
                id: self.last_id,
                flags: FLAGS_STANDARD_QUERY,
                qdcount: 1,
                ..Default::default()
            },
            question: Some(DnsQuestion {
                name: domain.to_string(),
                qtype,
                qclass: CLASS_IN,
            }),
        }
    }

    pub fn last_id(&self) -> u16 {
        self.last_id
    }
}
