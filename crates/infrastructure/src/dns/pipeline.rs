use whack_domain::config::{Framing, PipelineConfig};
use whack_domain::dns_message::MAX_MESSAGE_LEN;
use whack_domain::{CodecError, XskError};

use super::cache::{Clock, CoarseClock, ResponseCache};
use super::codec;
use super::packet::{self, UdpFrame};
use super::rate_limit::TxBudget;
use crate::xsk::{RxFrame, XskSocket};

/// Hot-path counters, reported in aggregate by the event loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    /// Replies served from the cache.
    pub replayed: u64,
    /// Received responses cached and sent back unchanged.
    pub echoed: u64,
    /// Frames that were not IPv4/UDP.
    pub not_udp: u64,
    pub parse_failures: u64,
    pub upstream_errors: u64,
    /// Cached reply did not fit in the received frame.
    pub oversize: u64,
    pub rate_limited: u64,
    pub tx_ring_full: u64,
    pub tx_errors: u64,
}

impl PipelineStats {
    pub fn dropped(&self) -> u64 {
        self.not_udp
            + self.parse_failures
            + self.upstream_errors
            + self.oversize
            + self.rate_limited
            + self.tx_ring_full
            + self.tx_errors
    }

    pub fn transmitted(&self) -> u64 {
        self.replayed + self.echoed
    }

    pub fn since(&self, earlier: &PipelineStats) -> PipelineStats {
        PipelineStats {
            frames: self.frames.saturating_sub(earlier.frames),
            replayed: self.replayed.saturating_sub(earlier.replayed),
            echoed: self.echoed.saturating_sub(earlier.echoed),
            not_udp: self.not_udp.saturating_sub(earlier.not_udp),
            parse_failures: self.parse_failures.saturating_sub(earlier.parse_failures),
            upstream_errors: self.upstream_errors.saturating_sub(earlier.upstream_errors),
            oversize: self.oversize.saturating_sub(earlier.oversize),
            rate_limited: self.rate_limited.saturating_sub(earlier.rate_limited),
            tx_ring_full: self.tx_ring_full.saturating_sub(earlier.tx_ring_full),
            tx_errors: self.tx_errors.saturating_sub(earlier.tx_errors),
        }
    }
}

/// What one `process_batch` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub received: u32,
    pub transmitted: u32,
    pub dropped: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropReason {
    NotUdp,
    Malformed,
    Upstream,
    Oversize,
}

/// A reply laid out in place inside the received frame.
struct Staged {
    offset: usize,
    len: usize,
    replay: bool,
}

/// Observe-cache-and-echo over received DNS responses.
///
/// Each received response is keyed by its question name. A cached reply for
/// the name is sent back instead of the frame; otherwise the frame is cached
/// and sent back as is. Replies are built in the received frame itself.
pub struct Pipeline<C: Clock = CoarseClock> {
    cache: ResponseCache<C>,
    framing: Framing,
    echo_ttl: u32,
    batch_size: u32,
    budget: TxBudget,
    stats: PipelineStats,
}

impl<C: Clock> Pipeline<C> {
    pub fn new(cache: ResponseCache<C>, config: &PipelineConfig, batch_size: u32) -> Self {
        Self {
            cache,
            framing: config.framing,
            echo_ttl: config.echo_ttl,
            batch_size,
            budget: TxBudget::new(config.rate_limit),
            stats: PipelineStats::default(),
        }
    }

    /// Runs one receive batch through the cache and transmits the replies.
    ///
    /// Every received frame ends up queued for TX or recycled to the fill
    /// ring, and the batch's RX descriptors are released.
    pub fn process_batch(&mut self, socket: &mut XskSocket) -> BatchOutcome {
        let batch = socket.receive_batch(self.batch_size);
        let mut outcome = BatchOutcome {
            received: batch.len() as u32,
            ..Default::default()
        };

        for rx in batch {
            self.stats.frames += 1;
            let staged = match self.stage(socket, &rx) {
                Ok(staged) => staged,
                Err(reason) => {
                    self.count_drop(reason);
                    socket.recycle(rx.handle);
                    outcome.dropped += 1;
                    continue;
                }
            };

            if !self.budget.try_acquire(self.cache.clock().now_secs()) {
                self.stats.rate_limited += 1;
                socket.recycle(rx.handle);
                outcome.dropped += 1;
                continue;
            }

            match socket.transmit_at(rx.handle, staged.offset, staged.len) {
                Ok(()) => {
                    outcome.transmitted += 1;
                    if staged.replay {
                        self.stats.replayed += 1;
                    } else {
                        self.stats.echoed += 1;
                    }
                }
                Err(rejected) => {
                    if rejected.reason == XskError::RingFull {
                        self.stats.tx_ring_full += 1;
                    } else {
                        self.stats.tx_errors += 1;
                    }
                    socket.recycle(rejected.frame);
                    outcome.dropped += 1;
                }
            }
        }

        socket.release_rx(outcome.received);
        socket.refill();
        outcome
    }

    fn stage(&mut self, socket: &mut XskSocket, rx: &RxFrame) -> Result<Staged, DropReason> {
        let bytes = socket.payload(rx).map_err(|_| DropReason::Malformed)?;
        let udp = match self.framing {
            Framing::Udp => Some(packet::parse_udp(bytes).ok_or(DropReason::NotUdp)?),
            Framing::Raw => None,
        };
        let dns = udp.as_ref().map_or(bytes, |u| u.payload(bytes));

        match codec::decode_response(dns) {
            Ok(_) => {}
            Err(CodecError::UpstreamError { .. }) => return Err(DropReason::Upstream),
            Err(_) => return Err(DropReason::Malformed),
        }
        let (name, _) = codec::question_name(dns).map_err(|_| DropReason::Malformed)?;

        let mut cached = [0u8; MAX_MESSAGE_LEN];
        let replay_len = match self.cache.lookup(&name) {
            Some(bytes) => {
                cached[..bytes.len()].copy_from_slice(bytes);
                Some(bytes.len())
            }
            None => {
                self.cache.insert(&name, dns, self.echo_ttl);
                None
            }
        };

        let frame = socket
            .frame_mut(&rx.handle)
            .map_err(|_| DropReason::Malformed)?;
        let frame = &mut frame[rx.offset..];
        let len = match (udp, replay_len) {
            (None, None) => rx.len,
            (None, Some(n)) => {
                place(frame, 0, &cached[..n])?;
                n
            }
            (Some(u), None) => packet::reflect(frame, &u, u.payload_len),
            (Some(u), Some(n)) => reply_udp(frame, &u, &cached[..n])?,
        };

        Ok(Staged {
            offset: rx.offset,
            len,
            replay: replay_len.is_some(),
        })
    }

    fn count_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::NotUdp => self.stats.not_udp += 1,
            DropReason::Malformed => self.stats.parse_failures += 1,
            DropReason::Upstream => self.stats.upstream_errors += 1,
            DropReason::Oversize => self.stats.oversize += 1,
        }
    }

    pub fn cache(&self) -> &ResponseCache<C> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ResponseCache<C> {
        &mut self.cache
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }
}

fn place(frame: &mut [u8], at: usize, bytes: &[u8]) -> Result<(), DropReason> {
    frame
        .get_mut(at..at + bytes.len())
        .ok_or(DropReason::Oversize)?
        .copy_from_slice(bytes);
    Ok(())
}

fn reply_udp(frame: &mut [u8], udp: &UdpFrame, payload: &[u8]) -> Result<usize, DropReason> {
    place(frame, udp.payload_offset, payload)?;
    Ok(packet::reflect(frame, udp, payload.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::cache::ManualClock;
    use crate::dns::query_builder::QueryBuilder;
    use crate::xsk::loopback::test_config;
    use whack_domain::RecordType;

    fn response(name: &str, id: u16, rcode: u16) -> Vec<u8> {
        let mut builder = QueryBuilder::starting_at(id);
        let mut msg = builder.build_query(name, RecordType::A);
        msg.header.flags = 0x8180 | rcode;
        let mut out = [0u8; 512];
        let n = codec::encode(&msg, &mut out).unwrap();
        out[..n].to_vec()
    }

    fn udp_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; 42];
        frame[0..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
        frame[6..12].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
        frame[12..14].copy_from_slice(&0x0800u16.to_be_bytes());
        frame[14] = 0x45;
        frame[16..18].copy_from_slice(&((28 + payload.len()) as u16).to_be_bytes());
        frame[22] = 64;
        frame[23] = 17;
        frame[26..30].copy_from_slice(&[10, 0, 0, 53]);
        frame[30..34].copy_from_slice(&[10, 0, 0, 7]);
        frame[34..36].copy_from_slice(&53u16.to_be_bytes());
        frame[36..38].copy_from_slice(&40000u16.to_be_bytes());
        frame[38..40].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    fn raw_pipeline(clock: ManualClock, rate_limit: u32) -> Pipeline<ManualClock> {
        let config = PipelineConfig {
            framing: Framing::Raw,
            rate_limit,
            ..Default::default()
        };
        Pipeline::new(ResponseCache::with_clock(64, 3600, clock), &config, 64)
    }

    fn udp_pipeline(clock: ManualClock) -> Pipeline<ManualClock> {
        let config = PipelineConfig {
            framing: Framing::Udp,
            rate_limit: 0,
            ..Default::default()
        };
        Pipeline::new(ResponseCache::with_clock(64, 3600, clock), &config, 64)
    }

    #[test]
    fn test_miss_caches_and_echoes() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let mut pipeline = raw_pipeline(ManualClock::new(1000), 0);
        let msg = response("Example.COM", 7, 0);
        kernel.deliver(&msg);

        let outcome = pipeline.process_batch(&mut socket);
        assert_eq!(
            outcome,
            BatchOutcome {
                received: 1,
                transmitted: 1,
                dropped: 0
            }
        );
        assert_eq!(kernel.transmit_all(), vec![msg.clone()]);
        assert_eq!(pipeline.stats().echoed, 1);
        assert_eq!(
            pipeline.cache_mut().lookup("example.com"),
            Some(msg.as_slice())
        );
    }

    #[test]
    fn test_hit_replays_cached_bytes() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let mut pipeline = raw_pipeline(ManualClock::new(1000), 0);
        let first = response("example.com", 1, 0);
        let second = response("example.com", 2, 0);

        kernel.deliver(&first);
        pipeline.process_batch(&mut socket);
        kernel.transmit_all();
        socket.complete_tx();

        kernel.deliver(&second);
        pipeline.process_batch(&mut socket);
        assert_eq!(kernel.transmit_all(), vec![first]);
        assert_eq!(pipeline.stats().replayed, 1);
        assert_eq!(pipeline.cache().stats().hits, 1);
    }

    #[test]
    fn test_upstream_failure_is_dropped_not_cached() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let mut pipeline = raw_pipeline(ManualClock::new(1000), 0);
        kernel.deliver(&response("fail.example", 3, 2));

        let outcome = pipeline.process_batch(&mut socket);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(pipeline.stats().upstream_errors, 1);
        assert!(kernel.take_tx().is_empty());
        assert!(pipeline.cache().is_empty());
        assert_eq!(socket.frame_counts().owned_by_app, 0);
    }

    #[test]
    fn test_short_frame_counts_parse_failure() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let mut pipeline = raw_pipeline(ManualClock::new(1000), 0);
        kernel.deliver(&[0u8; 5]);

        pipeline.process_batch(&mut socket);
        assert_eq!(pipeline.stats().parse_failures, 1);
        assert_eq!(socket.frame_counts().owned_by_app, 0);
        assert_eq!(socket.frame_counts().total(), 16);
    }

    fn with_qname(qname: &[u8]) -> Vec<u8> {
        let mut msg = vec![0, 9, 0x81, 0x80, 0, 1, 0, 0, 0, 0, 0, 0];
        msg.extend_from_slice(qname);
        msg.extend_from_slice(&[0, 1, 0, 1]);
        msg
    }

    #[test]
    fn test_non_ascii_name_is_cached_and_echoed() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let mut pipeline = raw_pipeline(ManualClock::new(1000), 0);
        let msg = with_qname(&[4, b'c', b'a', b'f', 0xE9, 3, b'c', b'o', b'm', 0]);
        kernel.deliver(&msg);

        let outcome = pipeline.process_batch(&mut socket);
        assert_eq!(outcome.transmitted, 1);
        assert_eq!(pipeline.stats().parse_failures, 0);
        assert_eq!(kernel.transmit_all(), vec![msg.clone()]);
        assert_eq!(
            pipeline.cache_mut().lookup("caf\\233.com"),
            Some(msg.as_slice())
        );
    }

    #[test]
    fn test_dotted_label_does_not_replay_other_name() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let mut pipeline = raw_pipeline(ManualClock::new(1000), 0);
        let two_labels = with_qname(&[1, b'a', 1, b'b', 0]);
        let one_label = with_qname(&[3, b'a', b'.', b'b', 0]);

        kernel.deliver(&two_labels);
        pipeline.process_batch(&mut socket);
        kernel.transmit_all();
        socket.complete_tx();

        kernel.deliver(&one_label);
        pipeline.process_batch(&mut socket);
        assert_eq!(kernel.transmit_all(), vec![one_label]);
        assert_eq!(pipeline.stats().echoed, 2);
        assert_eq!(pipeline.stats().replayed, 0);
    }

    #[test]
    fn test_compressed_question_is_parse_failure() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let mut pipeline = raw_pipeline(ManualClock::new(1000), 0);
        let mut msg = response("a.b", 1, 0);
        msg.truncate(12);
        msg.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1]);
        kernel.deliver(&msg);

        pipeline.process_batch(&mut socket);
        assert_eq!(pipeline.stats().parse_failures, 1);
    }

    #[test]
    fn test_rate_limit_drops_excess() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let clock = ManualClock::new(1000);
        let mut pipeline = raw_pipeline(clock.clone(), 2);
        for i in 0..4 {
            kernel.deliver(&response(&format!("host{}.test", i), i, 0));
        }

        let outcome = pipeline.process_batch(&mut socket);
        assert_eq!(outcome.transmitted, 2);
        assert_eq!(pipeline.stats().rate_limited, 2);
        assert_eq!(kernel.transmit_all().len(), 2);
        socket.complete_tx();

        clock.advance(1);
        kernel.deliver(&response("later.test", 9, 0));
        assert_eq!(pipeline.process_batch(&mut socket).transmitted, 1);
    }

    #[test]
    fn test_tx_ring_full_recycles_frame() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 2));
        let mut pipeline = raw_pipeline(ManualClock::new(1000), 0);
        kernel.deliver(&response("a.test", 1, 0));
        kernel.deliver(&response("b.test", 2, 0));
        pipeline.process_batch(&mut socket);

        kernel.deliver(&response("c.test", 3, 0));
        let outcome = pipeline.process_batch(&mut socket);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(pipeline.stats().tx_ring_full, 1);
        assert_eq!(socket.outstanding_tx(), 2);
        assert_eq!(socket.frame_counts().total(), 16);
    }

    #[test]
    fn test_udp_echo_swaps_endpoints() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let mut pipeline = udp_pipeline(ManualClock::new(1000));
        let dns = response("example.com", 5, 0);
        kernel.deliver(&udp_frame(&dns));

        pipeline.process_batch(&mut socket);
        let sent = kernel.transmit_all();
        assert_eq!(sent.len(), 1);
        let reply = &sent[0];
        assert_eq!(&reply[0..6], &[0x02, 0, 0, 0, 0, 0x02]);
        assert_eq!(&reply[26..30], &[10, 0, 0, 7]);
        assert_eq!(&reply[30..34], &[10, 0, 0, 53]);
        assert_eq!(u16::from_be_bytes([reply[34], reply[35]]), 40000);
        assert_eq!(u16::from_be_bytes([reply[36], reply[37]]), 53);
        assert_eq!(&reply[42..], dns.as_slice());
        assert_eq!(packet::ipv4_checksum(&reply[14..34]), 0);
    }

    #[test]
    fn test_udp_hit_rewrites_payload_and_lengths() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let mut pipeline = udp_pipeline(ManualClock::new(1000));
        let cached = response("example.com", 1, 0);
        pipeline.cache_mut().insert("example.com", &cached, 0);

        let mut longer = response("example.com", 2, 0);
        longer.extend_from_slice(&[0u8; 20]);
        kernel.deliver(&udp_frame(&longer));
        pipeline.process_batch(&mut socket);

        let sent = kernel.transmit_all();
        let reply = &sent[0];
        assert_eq!(reply.len(), 42 + cached.len());
        assert_eq!(&reply[42..], cached.as_slice());
        assert_eq!(
            u16::from_be_bytes([reply[16], reply[17]]) as usize,
            28 + cached.len()
        );
        assert_eq!(
            u16::from_be_bytes([reply[38], reply[39]]) as usize,
            8 + cached.len()
        );
        assert_eq!(pipeline.stats().replayed, 1);
    }

    #[test]
    fn test_non_udp_frame_dropped_in_udp_mode() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(16, 8));
        let mut pipeline = udp_pipeline(ManualClock::new(1000));
        let mut frame = udp_frame(&response("x.test", 1, 0));
        frame[12..14].copy_from_slice(&0x86DDu16.to_be_bytes());
        kernel.deliver(&frame);

        pipeline.process_batch(&mut socket);
        assert_eq!(pipeline.stats().not_udp, 1);
    }

    #[test]
    fn test_sustained_reception_recycles_frames() {
        let (mut socket, mut kernel) = XskSocket::loopback(&test_config(8, 8));
        let mut pipeline = raw_pipeline(ManualClock::new(1000), 0);
        for i in 0..100u16 {
            assert!(kernel.deliver(&response("loop.test", i, 0)), "round {}", i);
            pipeline.process_batch(&mut socket);
            kernel.transmit_all();
            socket.complete_tx();
            socket.refill();
        }
        assert_eq!(pipeline.stats().frames, 100);
        assert_eq!(socket.frame_counts().total(), 8);
    }
}
