use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::Duration;

use smallvec::SmallVec;
use tracing::{debug, info, warn};
use whack_domain::config::XskConfig;
use whack_domain::XskError;

use super::arena::FrameArena;
use super::frame::{FrameCounts, FrameHandle, FrameState, FrameTracker, RxFrame};
use super::ring::{RingRole, XskRing};
use super::stats::XskStats;
use super::sys::{
    self, XdpDesc, XdpUmemReg, XDP_COPY, XDP_PGOFF_RX_RING, XDP_PGOFF_TX_RING, XDP_RX_RING,
    XDP_TX_RING, XDP_UMEM_COMPLETION_RING, XDP_UMEM_FILL_RING, XDP_UMEM_PGOFF_COMPLETION_RING,
    XDP_UMEM_PGOFF_FILL_RING, XDP_UMEM_REG, XDP_USE_NEED_WAKEUP, XDP_ZEROCOPY,
};

/// Frames handed out by one `receive_batch` call.
pub type RxBatch = SmallVec<[RxFrame; 64]>;

const DRAIN_BACKOFF: Duration = Duration::from_micros(100);
const IDLE_POLL_CAP_MS: u64 = 5;

/// A transmit the socket refused. The caller gets its frame back.
#[derive(Debug)]
pub struct TxRejected {
    pub frame: FrameHandle,
    pub reason: XskError,
}

pub(crate) struct Rings {
    pub fill: XskRing<u64>,
    pub comp: XskRing<u64>,
    pub rx: XskRing<XdpDesc>,
    pub tx: XskRing<XdpDesc>,
}

// Field order is teardown order: rings, then the socket, then the arena.
pub(crate) struct Bound {
    pub rings: Rings,
    pub fd: Option<OwnedFd>,
    pub arena: FrameArena,
}

/// An AF_XDP socket bound to one interface queue, with its UMEM arena and
/// the four rings. Tracks every frame's state so none is lost or handed to
/// the kernel twice.
///
/// Not `Send`: the rings are owned by the thread that opened them.
pub struct XskSocket {
    bound: Option<Bound>,
    frames: FrameTracker,
    interface: String,
    queue_id: u32,
    zero_copy: bool,
    drain_retries: u32,
    fill_seen: u32,
    rx_unreleased: u32,
    outstanding_tx: u32,
    stats: XskStats,
}

impl XskSocket {
    /// Allocates the arena, registers it as UMEM, maps the rings, binds to
    /// `interface`/`queue_id` and pre-fills the fill ring.
    ///
    /// An XDP program redirecting the queue into this socket's XSKMAP slot
    /// must be attached separately; see [`Self::raw_fd`].
    pub fn open(config: &XskConfig) -> Result<Self, XskError> {
        let ifindex = sys::if_nametoindex(&config.interface)
            .ok_or_else(|| XskError::InterfaceNotFound(config.interface.clone()))?;

        let arena = FrameArena::allocate(config.num_frames, config.frame_size)?;
        let fd = sys::xsk_socket().map_err(|e| XskError::SocketCreate(format!("socket: {}", e)))?;

        let umem = XdpUmemReg {
            addr: arena.base_ptr() as u64,
            len: arena.len() as u64,
            chunk_size: config.frame_size,
            ..Default::default()
        };
        let umem_err = |what: &str, e: std::io::Error| XskError::UmemCreate(format!("{}: {}", what, e));
        sys::set_option(&fd, XDP_UMEM_REG, &umem).map_err(|e| umem_err("register", e))?;
        sys::set_option(&fd, XDP_UMEM_FILL_RING, &config.fill_ring_size)
            .map_err(|e| umem_err("fill ring", e))?;
        sys::set_option(&fd, XDP_UMEM_COMPLETION_RING, &config.comp_ring_size)
            .map_err(|e| umem_err("completion ring", e))?;

        let sock_err =
            |what: &str, e: std::io::Error| XskError::SocketCreate(format!("{}: {}", what, e));
        sys::set_option(&fd, XDP_RX_RING, &config.rx_ring_size)
            .map_err(|e| sock_err("rx ring", e))?;
        sys::set_option(&fd, XDP_TX_RING, &config.tx_ring_size)
            .map_err(|e| sock_err("tx ring", e))?;

        let offsets = sys::mmap_offsets(&fd).map_err(|e| sock_err("mmap offsets", e))?;
        let rings = Rings {
            fill: XskRing::map(
                &fd,
                &offsets.fr,
                XDP_UMEM_PGOFF_FILL_RING,
                config.fill_ring_size,
                RingRole::Producer,
            )
            .map_err(|e| sock_err("map fill ring", e))?,
            comp: XskRing::map(
                &fd,
                &offsets.cr,
                XDP_UMEM_PGOFF_COMPLETION_RING,
                config.comp_ring_size,
                RingRole::Consumer,
            )
            .map_err(|e| sock_err("map completion ring", e))?,
            rx: XskRing::map(
                &fd,
                &offsets.rx,
                XDP_PGOFF_RX_RING,
                config.rx_ring_size,
                RingRole::Consumer,
            )
            .map_err(|e| sock_err("map rx ring", e))?,
            tx: XskRing::map(
                &fd,
                &offsets.tx,
                XDP_PGOFF_TX_RING,
                config.tx_ring_size,
                RingRole::Producer,
            )
            .map_err(|e| sock_err("map tx ring", e))?,
        };

        let zero_copy = bind_queue(&fd, ifindex, config)?;

        let mut socket = Self::assemble(
            Bound {
                rings,
                fd: Some(fd),
                arena,
            },
            config,
            zero_copy,
        );
        let filled = socket.refill();

        info!(
            interface = %config.interface,
            ifindex,
            queue_id = config.queue_id,
            zero_copy,
            num_frames = config.num_frames,
            frame_size = config.frame_size,
            filled,
            "AF_XDP socket bound"
        );

        Ok(socket)
    }

    pub(crate) fn assemble(bound: Bound, config: &XskConfig, zero_copy: bool) -> Self {
        let fill_seen = bound.rings.fill.consumer_index();
        Self {
            frames: FrameTracker::new(bound.arena.num_frames()),
            bound: Some(bound),
            interface: config.interface.clone(),
            queue_id: config.queue_id,
            zero_copy,
            drain_retries: config.close_drain_retries,
            fill_seen,
            rx_unreleased: 0,
            outstanding_tx: 0,
            stats: XskStats::default(),
        }
    }

    /// Moves frames the kernel has taken off the fill ring to `OwnedByKernelRx`.
    fn observe_fill_consumption(&mut self) {
        let Some(bound) = self.bound.as_mut() else {
            return;
        };
        let consumed = bound.rings.fill.consumer_index();
        let mut idx = self.fill_seen;
        while idx != consumed {
            let addr = bound.rings.fill.read(idx);
            if let Some((index, _)) = bound.arena.locate(addr) {
                // RX may have claimed it already.
                let _ = self.frames.transition(
                    index,
                    &[FrameState::InFillQueue],
                    FrameState::OwnedByKernelRx,
                );
            }
            idx = idx.wrapping_add(1);
        }
        self.fill_seen = consumed;
        bound.rings.fill.sync_consumer(consumed);
    }

    /// Takes up to `max` received frames off the RX ring.
    ///
    /// Call [`Self::release_rx`] with the batch length once descriptors are
    /// consumed. Malformed descriptors are released here and only counted.
    pub fn receive_batch(&mut self, max: u32) -> RxBatch {
        let mut batch = RxBatch::new();
        self.observe_fill_consumption();
        let Some(bound) = self.bound.as_mut() else {
            return batch;
        };

        let (n, idx) = bound.rings.rx.peek(max);
        let mut invalid = 0;
        for i in 0..n {
            let desc = bound.rings.rx.read(idx.wrapping_add(i));
            match claim_rx(&mut self.frames, &bound.arena, desc) {
                Some(frame) => {
                    self.stats.rx_packets += 1;
                    self.stats.rx_bytes += frame.len as u64;
                    batch.push(frame);
                }
                None => {
                    debug!(addr = desc.addr, len = desc.len, "Dropping invalid RX descriptor");
                    invalid += 1;
                }
            }
        }
        if invalid > 0 {
            bound.rings.rx.release(invalid);
            self.stats.rx_invalid += invalid as u64;
        }
        self.rx_unreleased += n - invalid;
        batch
    }

    /// Hands `count` consumed RX descriptors back to the kernel.
    pub fn release_rx(&mut self, count: u32) {
        let count = count.min(self.rx_unreleased);
        let Some(bound) = self.bound.as_mut() else {
            return;
        };
        if count > 0 {
            bound.rings.rx.release(count);
            self.rx_unreleased -= count;
        }
    }

    /// Returns a frame to the fill ring, or to the free pool if the fill
    /// ring has no room.
    pub fn recycle(&mut self, frame: FrameHandle) {
        let index = frame.index();
        if self.frames.state(index) != Some(FrameState::OwnedByApp) {
            warn!(index, "Recycle of a frame the application does not own");
            return;
        }
        self.observe_fill_consumption();
        let Some(bound) = self.bound.as_mut() else {
            return;
        };

        let (n, idx) = bound.rings.fill.reserve_cached(1);
        let to = if n == 1 {
            bound.rings.fill.write(idx, bound.arena.frame_addr(index));
            bound.rings.fill.submit(1);
            self.stats.fill_submitted += 1;
            FrameState::InFillQueue
        } else {
            self.stats.fill_ring_full += 1;
            FrameState::Free
        };
        let _ = self
            .frames
            .transition(index, &[FrameState::OwnedByApp], to);
    }

    /// Moves as many free frames as fit into the fill ring. Returns how many moved.
    pub fn refill(&mut self) -> u32 {
        self.observe_fill_consumption();
        let Some(bound) = self.bound.as_mut() else {
            return 0;
        };
        let want = self.frames.free_count() as u32;
        if want == 0 {
            return 0;
        }

        let (n, idx) = bound.rings.fill.reserve_cached(want);
        let mut written = 0;
        while written < n {
            let Some(index) = self.frames.take_free(FrameState::InFillQueue) else {
                break;
            };
            bound
                .rings
                .fill
                .write(idx.wrapping_add(written), bound.arena.frame_addr(index));
            written += 1;
        }
        if written > 0 {
            bound.rings.fill.submit(written);
            self.stats.fill_submitted += written as u64;
        }
        written
    }

    /// Takes a free frame for the application to build a packet in.
    pub fn alloc_frame(&mut self) -> Option<FrameHandle> {
        self.bound.as_ref()?;
        self.frames
            .take_free(FrameState::OwnedByApp)
            .map(FrameHandle::new)
    }

    pub fn frame(&self, frame: &FrameHandle) -> Result<&[u8], XskError> {
        self.bound
            .as_ref()
            .ok_or(XskError::Closed)?
            .arena
            .frame(frame.index())
    }

    pub fn frame_mut(&mut self, frame: &FrameHandle) -> Result<&mut [u8], XskError> {
        self.bound
            .as_mut()
            .ok_or(XskError::Closed)?
            .arena
            .frame_mut(frame.index())
    }

    /// The received bytes of `rx`.
    pub fn payload(&self, rx: &RxFrame) -> Result<&[u8], XskError> {
        let frame = self.frame(&rx.handle)?;
        rx.offset
            .checked_add(rx.len)
            .and_then(|end| frame.get(rx.offset..end))
            .ok_or(XskError::FrameOutOfBounds {
                offset: rx.offset,
                len: rx.len,
                frame_size: frame.len(),
            })
    }

    /// Queues `len` bytes at the start of `frame` for transmission.
    pub fn transmit(&mut self, frame: FrameHandle, len: usize) -> Result<(), TxRejected> {
        self.transmit_at(frame, 0, len)
    }

    /// Queues `len` bytes starting at `offset` within `frame`.
    pub fn transmit_at(
        &mut self,
        frame: FrameHandle,
        offset: usize,
        len: usize,
    ) -> Result<(), TxRejected> {
        let index = frame.index();
        let Some(bound) = self.bound.as_mut() else {
            return Err(TxRejected {
                frame,
                reason: XskError::Closed,
            });
        };
        let frame_size = bound.arena.frame_size() as usize;
        if offset.checked_add(len).map_or(true, |end| end > frame_size) {
            return Err(TxRejected {
                frame,
                reason: XskError::FrameOutOfBounds {
                    offset,
                    len,
                    frame_size,
                },
            });
        }
        if self.frames.state(index) != Some(FrameState::OwnedByApp) {
            let state = self.frames.state(index).map_or("out_of_range", |s| s.as_str());
            return Err(TxRejected {
                frame,
                reason: XskError::InvalidFrame { index, state },
            });
        }
        let Some(idx) = bound.rings.tx.reserve(1) else {
            self.stats.tx_ring_full += 1;
            return Err(TxRejected {
                frame,
                reason: XskError::RingFull,
            });
        };

        bound.rings.tx.write(
            idx,
            XdpDesc {
                addr: bound.arena.frame_addr(index) + offset as u64,
                len: len as u32,
                options: 0,
            },
        );
        bound.rings.tx.submit(1);
        let _ = self
            .frames
            .transition(index, &[FrameState::OwnedByApp], FrameState::QueuedForTx);
        self.outstanding_tx += 1;
        self.stats.tx_packets += 1;
        self.stats.tx_bytes += len as u64;

        if bound.rings.tx.needs_wakeup() {
            kick(bound, &mut self.stats);
        }
        Ok(())
    }

    /// Drains the completion ring, freeing finished TX frames. Returns how
    /// many were freed.
    ///
    /// Completions naming no queued frame are consumed and counted in
    /// `tx_invalid_completions`; they do not reduce `outstanding_tx`.
    pub fn complete_tx(&mut self) -> u32 {
        if self.outstanding_tx == 0 {
            return 0;
        }
        let Some(bound) = self.bound.as_mut() else {
            return 0;
        };
        if bound.rings.tx.needs_wakeup() {
            kick(bound, &mut self.stats);
        }

        let (n, idx) = bound.rings.comp.peek(self.outstanding_tx);
        let mut freed = 0;
        for i in 0..n {
            let addr = bound.rings.comp.read(idx.wrapping_add(i));
            let queued = bound.arena.locate(addr).and_then(|(index, _)| {
                self.frames
                    .transition(index, &[FrameState::QueuedForTx], FrameState::InCompletionQueue)
                    .ok()
                    .map(|_| index)
            });
            let Some(index) = queued else {
                debug!(addr, "Completion for a frame that was not queued for TX");
                self.stats.tx_invalid_completions += 1;
                continue;
            };
            let _ = self
                .frames
                .transition(index, &[FrameState::InCompletionQueue], FrameState::Free);
            freed += 1;
        }
        if n > 0 {
            bound.rings.comp.release(n);
            self.outstanding_tx -= freed;
            self.stats.tx_completions += freed as u64;
        }
        freed
    }

    /// Waits up to `timeout_ms` for RX data. `Ok(false)` on timeout.
    pub fn poll(&mut self, timeout_ms: i32) -> Result<bool, XskError> {
        let bound = self.bound.as_mut().ok_or(XskError::Closed)?;
        match &bound.fd {
            Some(fd) => sys::poll_readable(fd, timeout_ms).map_err(|e| XskError::Io(e.to_string())),
            None => {
                if bound.rings.rx.pending() > 0 {
                    return Ok(true);
                }
                let wait = (timeout_ms.max(0) as u64).min(IDLE_POLL_CAP_MS);
                std::thread::sleep(Duration::from_millis(wait));
                Ok(bound.rings.rx.pending() > 0)
            }
        }
    }

    /// Drains in-flight transmissions (bounded), then tears down rings,
    /// socket and arena in that order. Safe to call more than once.
    pub fn close(&mut self) {
        if self.bound.is_none() {
            return;
        }

        let mut attempts = 0;
        while self.outstanding_tx > 0 && attempts < self.drain_retries {
            if let Some(bound) = self.bound.as_ref() {
                kick(bound, &mut self.stats);
            }
            if self.complete_tx() == 0 {
                std::thread::sleep(DRAIN_BACKOFF);
            }
            attempts += 1;
        }
        if self.outstanding_tx > 0 {
            warn!(
                outstanding_tx = self.outstanding_tx,
                attempts, "Closing with transmissions still in flight"
            );
        }

        if let Some(Bound { rings, fd, arena }) = self.bound.take() {
            drop(rings);
            drop(fd);
            arena.release();
        }

        info!(
            interface = %self.interface,
            queue_id = self.queue_id,
            rx_packets = self.stats.rx_packets,
            tx_packets = self.stats.tx_packets,
            "AF_XDP socket closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.bound.is_none()
    }

    /// Descriptor for attaching this socket to an XSKMAP.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.bound
            .as_ref()
            .and_then(|b| b.fd.as_ref())
            .map(|fd| fd.as_raw_fd())
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn queue_id(&self) -> u32 {
        self.queue_id
    }

    pub fn zero_copy(&self) -> bool {
        self.zero_copy
    }

    pub fn outstanding_tx(&self) -> u32 {
        self.outstanding_tx
    }

    pub fn frame_state(&self, frame: &FrameHandle) -> Option<FrameState> {
        self.frames.state(frame.index())
    }

    pub fn frame_counts(&self) -> FrameCounts {
        self.frames.counts()
    }

    pub fn stats(&self) -> XskStats {
        self.stats
    }

    #[cfg(test)]
    pub(crate) fn rx_unreleased(&self) -> u32 {
        self.rx_unreleased
    }
}

impl Drop for XskSocket {
    fn drop(&mut self) {
        self.close();
    }
}

fn claim_rx(frames: &mut FrameTracker, arena: &FrameArena, desc: XdpDesc) -> Option<RxFrame> {
    let (index, offset) = arena.locate(desc.addr)?;
    let len = desc.len as usize;
    if offset.checked_add(len).map_or(true, |end| end > arena.frame_size() as usize) {
        return None;
    }
    frames
        .transition(
            index,
            &[FrameState::InFillQueue, FrameState::OwnedByKernelRx],
            FrameState::OwnedByApp,
        )
        .ok()?;
    Some(RxFrame {
        handle: FrameHandle::new(index),
        offset,
        len,
    })
}

fn kick(bound: &Bound, stats: &mut XskStats) {
    stats.wakeups += 1;
    if let Some(fd) = &bound.fd {
        if let Err(e) = sys::kick_tx(fd) {
            debug!(error = %e, "TX wakeup failed");
        }
    }
}

/// Binds with need-wakeup, trying zero-copy first when asked. Returns
/// whether the zero-copy bind took.
fn bind_queue(fd: &OwnedFd, ifindex: u32, config: &XskConfig) -> Result<bool, XskError> {
    let flags = (config.bind_flags & !(XDP_COPY | XDP_ZEROCOPY)) | XDP_USE_NEED_WAKEUP;
    let bind_err = |e: std::io::Error| XskError::SocketCreate(format!("bind: {}", e));

    if config.zero_copy {
        match sys::bind(fd, ifindex, config.queue_id, flags | XDP_ZEROCOPY) {
            Ok(()) => return Ok(true),
            Err(e) => {
                warn!(
                    interface = %config.interface,
                    error = %e,
                    "Zero-copy bind failed, falling back to copy mode"
                );
            }
        }
    }
    sys::bind(fd, ifindex, config.queue_id, flags | XDP_COPY).map_err(bind_err)?;
    Ok(false)
}
