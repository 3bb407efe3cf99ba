//! In-process stand-in for the kernel side of an AF_XDP socket.
//!
//! Rings live on the heap and the "kernel" is driven explicitly by the test:
//! it takes fill entries to deliver packets, and consumes TX descriptors and
//! posts completions when told to.

use whack_domain::config::XskConfig;

use super::arena::FrameArena;
use super::ring::{RingRole, XskRing};
use super::socket::{Bound, Rings, XskSocket};
use super::sys::XdpDesc;

/// Where delivered packets start inside a frame, like the kernel's XDP headroom.
pub(crate) const LOOPBACK_HEADROOM: usize = 256;

pub(crate) fn test_config(num_frames: u32, ring_size: u32) -> XskConfig {
    XskConfig {
        interface: "loopback-test".into(),
        num_frames,
        frame_size: 2048,
        rx_ring_size: ring_size,
        tx_ring_size: ring_size,
        fill_ring_size: ring_size,
        comp_ring_size: ring_size,
        batch_size: 64,
        zero_copy: false,
        close_drain_retries: 3,
        ..Default::default()
    }
}

pub(crate) struct LoopbackKernel {
    fill: XskRing<u64>,
    comp: XskRing<u64>,
    rx: XskRing<XdpDesc>,
    tx: XskRing<XdpDesc>,
    base: *mut u8,
    frame_size: usize,
}

impl XskSocket {
    pub(crate) fn loopback(config: &XskConfig) -> (XskSocket, LoopbackKernel) {
        let arena = FrameArena::allocate(config.num_frames, config.frame_size)
            .expect("arena allocation");
        let rings = Rings {
            fill: XskRing::heap(config.fill_ring_size, RingRole::Producer),
            comp: XskRing::heap(config.comp_ring_size, RingRole::Consumer),
            rx: XskRing::heap(config.rx_ring_size, RingRole::Consumer),
            tx: XskRing::heap(config.tx_ring_size, RingRole::Producer),
        };
        let kernel = LoopbackKernel {
            fill: rings.fill.peer_as(RingRole::Consumer),
            comp: rings.comp.peer_as(RingRole::Producer),
            rx: rings.rx.peer_as(RingRole::Producer),
            tx: rings.tx.peer_as(RingRole::Consumer),
            base: arena.base_ptr(),
            frame_size: arena.frame_size() as usize,
        };
        let mut socket = XskSocket::assemble(
            Bound {
                rings,
                fd: None,
                arena,
            },
            config,
            false,
        );
        socket.refill();
        (socket, kernel)
    }
}

impl LoopbackKernel {
    /// Receives `packet` into the next fill-ring frame. False when there is
    /// no fill entry or no RX slot.
    pub fn deliver(&mut self, packet: &[u8]) -> bool {
        assert!(packet.len() + LOOPBACK_HEADROOM <= self.frame_size);
        if self.fill.pending() == 0 {
            return false;
        }
        let Some(rx_idx) = self.rx.reserve(1) else {
            return false;
        };
        let (_, fill_idx) = self.fill.peek(1);
        let addr = self.fill.read(fill_idx);
        self.fill.release(1);

        let data = addr + LOOPBACK_HEADROOM as u64;
        unsafe {
            std::ptr::copy_nonoverlapping(
                packet.as_ptr(),
                self.base.add(data as usize),
                packet.len(),
            );
        }
        self.rx.write(
            rx_idx,
            XdpDesc {
                addr: data,
                len: packet.len() as u32,
                options: 0,
            },
        );
        self.rx.submit(1);
        true
    }

    /// Posts a raw RX descriptor without touching the fill ring.
    pub fn inject_rx(&mut self, desc: XdpDesc) {
        let idx = self.rx.reserve(1).expect("rx slot");
        self.rx.write(idx, desc);
        self.rx.submit(1);
    }

    /// Consumes queued TX descriptors, returning `(addr, bytes)` for each.
    /// Completions are not posted.
    pub fn take_tx(&mut self) -> Vec<(u64, Vec<u8>)> {
        let (n, idx) = self.tx.peek(u32::MAX);
        let sent = (0..n)
            .map(|i| {
                let desc = self.tx.read(idx.wrapping_add(i));
                let bytes = unsafe {
                    std::slice::from_raw_parts(self.base.add(desc.addr as usize), desc.len as usize)
                };
                (desc.addr, bytes.to_vec())
            })
            .collect();
        self.tx.release(n);
        sent
    }

    pub fn complete(&mut self, addrs: &[u64]) {
        let idx = self
            .comp
            .reserve(addrs.len() as u32)
            .expect("completion slots");
        for (i, addr) in addrs.iter().enumerate() {
            self.comp.write(idx.wrapping_add(i as u32), *addr);
        }
        self.comp.submit(addrs.len() as u32);
    }

    /// Sends everything queued and completes it.
    pub fn transmit_all(&mut self) -> Vec<Vec<u8>> {
        let sent = self.take_tx();
        let addrs: Vec<u64> = sent.iter().map(|(addr, _)| *addr).collect();
        self.complete(&addrs);
        sent.into_iter().map(|(_, bytes)| bytes).collect()
    }

    /// Fill entries posted by the socket and not yet taken.
    pub fn fill_available(&self) -> u32 {
        self.fill
            .producer_index()
            .wrapping_sub(self.fill.consumer_index())
    }

    pub fn set_tx_need_wakeup(&self, on: bool) {
        self.tx.set_needs_wakeup(on);
    }
}
