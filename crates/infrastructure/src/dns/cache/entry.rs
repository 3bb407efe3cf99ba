use compact_str::CompactString;
use whack_domain::dns_message::MAX_MESSAGE_LEN;

/// One cache slot. The response is stored inline so a slot never allocates
/// after the cache is built.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(super) domain: CompactString,
    pub(super) response: [u8; MAX_MESSAGE_LEN],
    pub(super) response_len: usize,
    pub(super) timestamp: u64,
    pub(super) ttl: u32,
    pub(super) valid: bool,
}

impl CacheEntry {
    pub(super) fn empty() -> Self {
        Self {
            domain: CompactString::default(),
            response: [0; MAX_MESSAGE_LEN],
            response_len: 0,
            timestamp: 0,
            ttl: 0,
            valid: false,
        }
    }

    pub(super) fn fill(&mut self, domain: &str, response: &[u8], now: u64, ttl: u32) {
        self.domain.clear();
        self.domain.push_str(domain);
        self.response[..response.len()].copy_from_slice(response);
        self.response_len = response.len();
        self.timestamp = now;
        self.ttl = ttl;
        self.valid = true;
    }

    /// Live means `now - timestamp <= ttl`: an entry is still served on the
    /// exact second its TTL runs out.
    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.timestamp) > self.ttl as u64
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn response(&self) -> &[u8] {
        &self.response[..self.response_len]
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}
