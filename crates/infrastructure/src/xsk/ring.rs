use std::io;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use super::sys::{Mmap, XdpRingOffset, XDP_RING_NEED_WAKEUP};

/// Which side of the ring this process drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RingRole {
    Producer,
    Consumer,
}

#[derive(Debug)]
enum Backing {
    Mapped(#[allow(dead_code)] Mmap),
    #[cfg(test)]
    Heap(#[allow(dead_code)] std::rc::Rc<heap::HeapRegion>),
}

/// Single-producer/single-consumer descriptor ring shared with the kernel.
///
/// Indices are free-running `u32` counters; slot = index & mask. Each side
/// keeps cached copies of both indices and only touches the shared words
/// when the cache runs dry.
#[derive(Debug)]
pub(crate) struct XskRing<T: Copy> {
    producer: NonNull<AtomicU32>,
    consumer: NonNull<AtomicU32>,
    flags: NonNull<AtomicU32>,
    desc: NonNull<T>,
    size: u32,
    mask: u32,
    cached_prod: u32,
    cached_cons: u32,
    _backing: Backing,
}

impl<T: Copy> XskRing<T> {
    pub fn map(
        fd: &OwnedFd,
        offsets: &XdpRingOffset,
        pgoff: libc::off_t,
        size: u32,
        role: RingRole,
    ) -> io::Result<Self> {
        let len = offsets.desc as usize + size as usize * std::mem::size_of::<T>();
        let region = Mmap::ring(fd, len, pgoff)?;
        let base = region.as_ptr();
        Ok(unsafe { Self::from_parts(base, offsets, size, role, Backing::Mapped(region)) })
    }

    /// # Safety
    /// `base` plus each offset must point into memory kept alive by `backing`,
    /// with room for `size` descriptors at `offsets.desc`.
    unsafe fn from_parts(
        base: *mut u8,
        offsets: &XdpRingOffset,
        size: u32,
        role: RingRole,
        backing: Backing,
    ) -> Self {
        let at = |off: u64| NonNull::new_unchecked(base.add(off as usize));
        let mut ring = Self {
            producer: at(offsets.producer).cast(),
            consumer: at(offsets.consumer).cast(),
            flags: at(offsets.flags).cast(),
            desc: at(offsets.desc).cast(),
            size,
            mask: size - 1,
            cached_prod: 0,
            cached_cons: 0,
            _backing: backing,
        };
        ring.cached_prod = ring.producer_word().load(Ordering::Acquire);
        ring.cached_cons = ring.consumer_word().load(Ordering::Acquire);
        if role == RingRole::Producer {
            ring.cached_cons = ring.cached_cons.wrapping_add(size);
        }
        ring
    }

    fn producer_word(&self) -> &AtomicU32 {
        unsafe { self.producer.as_ref() }
    }

    fn consumer_word(&self) -> &AtomicU32 {
        unsafe { self.consumer.as_ref() }
    }

    pub fn producer_index(&self) -> u32 {
        self.producer_word().load(Ordering::Acquire)
    }

    pub fn consumer_index(&self) -> u32 {
        self.consumer_word().load(Ordering::Acquire)
    }

    pub fn needs_wakeup(&self) -> bool {
        unsafe { self.flags.as_ref() }.load(Ordering::Relaxed) & XDP_RING_NEED_WAKEUP != 0
    }

    pub fn read(&self, idx: u32) -> T {
        unsafe { self.desc.as_ptr().add((idx & self.mask) as usize).read() }
    }

    pub fn write(&mut self, idx: u32, value: T) {
        unsafe { self.desc.as_ptr().add((idx & self.mask) as usize).write(value) }
    }

    // Producer side.

    fn free_slots(&mut self, nb: u32) -> u32 {
        let free = self.cached_cons.wrapping_sub(self.cached_prod);
        if free >= nb {
            return free;
        }
        self.cached_cons = self.consumer_index().wrapping_add(self.size);
        self.cached_cons.wrapping_sub(self.cached_prod)
    }

    /// Claims exactly `nb` slots, returning the first index.
    pub fn reserve(&mut self, nb: u32) -> Option<u32> {
        if self.free_slots(nb) < nb {
            return None;
        }
        let idx = self.cached_prod;
        self.cached_prod = idx.wrapping_add(nb);
        Some(idx)
    }

    /// Claims up to `nb` slots without re-reading the consumer word.
    /// Returns `(count, first index)`.
    pub fn reserve_cached(&mut self, nb: u32) -> (u32, u32) {
        let n = self.cached_cons.wrapping_sub(self.cached_prod).min(nb);
        let idx = self.cached_prod;
        self.cached_prod = idx.wrapping_add(n);
        (n, idx)
    }

    /// Records a consumer index the caller has already read.
    pub fn sync_consumer(&mut self, consumer: u32) {
        self.cached_cons = consumer.wrapping_add(self.size);
    }

    pub fn submit(&mut self, nb: u32) {
        let producer = self.producer_word();
        producer.store(
            producer.load(Ordering::Relaxed).wrapping_add(nb),
            Ordering::Release,
        );
    }

    // Consumer side.

    fn available(&mut self, nb: u32) -> u32 {
        let mut entries = self.cached_prod.wrapping_sub(self.cached_cons);
        if entries == 0 {
            self.cached_prod = self.producer_index();
            entries = self.cached_prod.wrapping_sub(self.cached_cons);
        }
        entries.min(nb)
    }

    /// Takes up to `nb` filled entries. Returns `(count, first index)`.
    pub fn peek(&mut self, nb: u32) -> (u32, u32) {
        let n = self.available(nb);
        let idx = self.cached_cons;
        self.cached_cons = idx.wrapping_add(n);
        (n, idx)
    }

    /// Entries ready to consume, without taking them.
    pub fn pending(&mut self) -> u32 {
        self.available(u32::MAX)
    }

    pub fn release(&mut self, nb: u32) {
        let consumer = self.consumer_word();
        consumer.store(
            consumer.load(Ordering::Relaxed).wrapping_add(nb),
            Ordering::Release,
        );
    }
}

#[cfg(test)]
pub(crate) mod heap {
    use std::ptr::NonNull;
    use std::rc::Rc;
    use std::sync::atomic::Ordering;

    use super::{Backing, RingRole, XskRing};
    use crate::xsk::sys::{XdpRingOffset, XDP_RING_NEED_WAKEUP};

    const DESC_OFFSET: u64 = 32;

    /// Word-aligned heap block standing in for a kernel ring mapping.
    #[derive(Debug)]
    pub struct HeapRegion {
        ptr: NonNull<u64>,
        words: usize,
    }

    impl HeapRegion {
        fn new(words: usize) -> Self {
            let block = vec![0u64; words].into_boxed_slice();
            let ptr = NonNull::new(Box::into_raw(block) as *mut u64).expect("box is non-null");
            Self { ptr, words }
        }
    }

    impl Drop for HeapRegion {
        fn drop(&mut self) {
            unsafe {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    self.ptr.as_ptr(),
                    self.words,
                )));
            }
        }
    }

    fn layout() -> XdpRingOffset {
        XdpRingOffset {
            producer: 0,
            consumer: 8,
            flags: 16,
            desc: DESC_OFFSET,
        }
    }

    impl<T: Copy> XskRing<T> {
        /// Ring over heap memory, for driving the socket without a kernel.
        pub fn heap(size: u32, role: RingRole) -> Self {
            let desc_bytes = size as usize * std::mem::size_of::<T>();
            let words = DESC_OFFSET as usize / 8 + desc_bytes.div_ceil(8);
            let region = Rc::new(HeapRegion::new(words));
            let base = region.ptr.as_ptr() as *mut u8;
            unsafe { Self::from_parts(base, &layout(), size, role, Backing::Heap(region)) }
        }

        /// The other end of a heap ring, sharing its memory.
        pub fn peer_as(&self, role: RingRole) -> Self {
            let Backing::Heap(region) = &self._backing else {
                panic!("peer_as() requires a heap ring");
            };
            let region = Rc::clone(region);
            let base = region.ptr.as_ptr() as *mut u8;
            unsafe { Self::from_parts(base, &layout(), self.size, role, Backing::Heap(region)) }
        }

        pub fn set_needs_wakeup(&self, on: bool) {
            let flags = unsafe { self.flags.as_ref() };
            if on {
                flags.fetch_or(XDP_RING_NEED_WAKEUP, Ordering::Relaxed);
            } else {
                flags.fetch_and(!XDP_RING_NEED_WAKEUP, Ordering::Relaxed);
            }
        }
    }
}
