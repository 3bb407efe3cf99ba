/// Socket counters, owned by the I/O thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XskStats {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    /// RX descriptors pointing outside the arena or at a frame the kernel
    /// did not own. Released without producing a handle.
    pub rx_invalid: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_ring_full: u64,
    pub tx_completions: u64,
    /// Completion entries naming a frame that was not queued for TX.
    pub tx_invalid_completions: u64,
    pub fill_submitted: u64,
    /// Recycled frames parked as free because the fill ring had no room.
    pub fill_ring_full: u64,
    pub wakeups: u64,
}

impl XskStats {
    /// Field-wise difference against an earlier snapshot.
    pub fn since(&self, earlier: &XskStats) -> XskStats {
        XskStats {
            rx_packets: self.rx_packets.saturating_sub(earlier.rx_packets),
            rx_bytes: self.rx_bytes.saturating_sub(earlier.rx_bytes),
            rx_invalid: self.rx_invalid.saturating_sub(earlier.rx_invalid),
            tx_packets: self.tx_packets.saturating_sub(earlier.tx_packets),
            tx_bytes: self.tx_bytes.saturating_sub(earlier.tx_bytes),
            tx_ring_full: self.tx_ring_full.saturating_sub(earlier.tx_ring_full),
            tx_completions: self.tx_completions.saturating_sub(earlier.tx_completions),
            tx_invalid_completions: self
                .tx_invalid_completions
                .saturating_sub(earlier.tx_invalid_completions),
            fill_submitted: self.fill_submitted.saturating_sub(earlier.fill_submitted),
            fill_ring_full: self.fill_ring_full.saturating_sub(earlier.fill_ring_full),
            wakeups: self.wakeups.saturating_sub(earlier.wakeups),
        }
    }
}
